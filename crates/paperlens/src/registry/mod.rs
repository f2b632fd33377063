//! Durable status/result registry: the single source of truth for job state.
//!
//! Writes go through named transitions that check the state machine and
//! persist with a compare-and-swap on the stored status. Reads are served
//! from an in-memory cache with database fallback.

pub mod error;
pub mod job_store;

pub use error::{ReadError, RegistryError};
pub use job_store::{JobListResponse, JobQuery, JobRegistry, StatusCounts};
