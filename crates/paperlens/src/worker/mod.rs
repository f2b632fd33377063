pub mod job;
pub mod orchestrator;

pub use job::{DocumentJob, JobStage, JobStatus, JobView, PaperMetadata, Stage, SubmitMetadata};
pub use orchestrator::{Orchestrator, PollPolicy, RecoveryReport, INTERRUPTED_REASON};
