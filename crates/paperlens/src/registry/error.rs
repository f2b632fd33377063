use thiserror::Error;

use crate::db::DatabaseError;
use crate::worker::job::JobStatus;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} is {status}, not processing")]
    NotProcessing { job_id: String, status: JobStatus },

    #[error("Job {0} would break the result link invariant")]
    ResultLink(String),

    #[error("Job {0} was changed by another writer")]
    Conflict(String),

    #[error("Stored record for job {job_id} is unreadable: {reason}")]
    Corrupt { job_id: String, reason: String },

    #[error("Failed to encode analysis result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl From<DatabaseError> for RegistryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::StaleWrite { id, .. } => Self::Conflict(id),
            other => Self::Database(other),
        }
    }
}

/// Errors returned to callers reading job state.
///
/// A job owned by someone else is reported as `NotFound`, so callers cannot
/// discover other principals' job ids.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is {status}; no result yet")]
    NotReady { status: JobStatus },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
