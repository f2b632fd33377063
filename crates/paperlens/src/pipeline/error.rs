use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a single stage invocation failed.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    ExitFailure {
        program: String,
        status: String,
        diagnostics: String,
    },

    #[error("Stage produced no output at '{0}'")]
    MissingOutput(PathBuf),

    #[error("Stage output '{0}' is empty")]
    EmptyOutput(PathBuf),

    #[error("Stage output '{path}' is malformed: {reason}")]
    MalformedOutput { path: PathBuf, reason: String },

    #[error("Failed to read stage output '{path}': {source}")]
    ReadOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Failed to prepare topic snapshot: {0}")]
    Snapshot(String),
}

impl StageError {
    /// Captured stdout/stderr, when the failure came from a finished process.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ExitFailure { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Extraction failed: {0}")]
    Extraction(StageError),

    #[error("Analysis failed: {0}")]
    Analysis(StageError),

    #[error("Registry update failed: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),
}

impl PipelineError {
    pub fn stage_error(&self) -> Option<&StageError> {
        match self {
            Self::Extraction(e) | Self::Analysis(e) => Some(e),
            _ => None,
        }
    }
}
