use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaperlensError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Read error: {0}")]
    Read(#[from] crate::registry::ReadError),

    #[error("Delete error: {0}")]
    Delete(#[from] DeleteError),

    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),

    #[error("Taxonomy error: {0}")]
    Taxonomy(#[from] crate::taxonomy::TaxonomyError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("No config file found and no home directory to look in")]
    NoConfigLocation,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

/// Rejections raised synchronously by `submit`, before any job or file exists.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported document type: {0}")]
    UnsupportedType(String),

    #[error("Declared MIME type '{mime_type}' does not match extension '.{extension}'")]
    TypeMismatch {
        extension: String,
        mime_type: String,
    },

    #[error("Document is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Document is empty")]
    Empty,

    #[error("Owner id must not be empty")]
    MissingOwner,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid document: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to store document: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to register job: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error("No Tokio runtime available to run the pipeline")]
    NoRuntime,
}

#[derive(Error, Debug)]
pub enum DeleteError {
    #[error("Job not found")]
    NotFound,

    #[error("Job {0} is still being processed")]
    JobBusy(String),

    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Job not found")]
    NotFound,

    #[error("Job did not reach a terminal state after {attempts} polls")]
    TimedOut { attempts: u32 },

    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),
}

pub type Result<T> = std::result::Result<T, PaperlensError>;
