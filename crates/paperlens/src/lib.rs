pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod taxonomy;
pub mod worker;

pub use analysis::{AnalysisResult, ExtractedTopic, SuggestedArea, SuggestedTopic};
pub use config::{load_config, Config, DocumentFormat, RecoveryPolicy};
pub use db::Database;
pub use error::{
    ConfigError, DeleteError, PaperlensError, Result, StorageError, SubmitError, ValidationError,
    WaitError,
};
pub use pipeline::{Analyzer, Extractor, Pipeline, PipelineConfig, PipelineContext, StageError};
pub use registry::{JobRegistry, ReadError, RegistryError};
pub use secrets::{resolve_secret, SecretError};
pub use storage::DocumentStore;
pub use taxonomy::{StaticTopics, Topic, TopicCatalog, TopicProvider, TopicSnapshot};
pub use worker::{DocumentJob, JobStatus, Orchestrator, PollPolicy, SubmitMetadata};
