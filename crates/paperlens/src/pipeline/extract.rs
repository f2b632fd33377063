use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::storage::metadata_sidecar_path;
use crate::worker::job::PaperMetadata;

use super::command::CapabilityCommand;
use super::error::StageError;

pub struct ExtractionRequest<'a> {
    pub job_id: &'a str,
    pub source_path: &'a Path,
    pub output_path: &'a Path,
}

/// A successfully extracted text artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub path: PathBuf,
    pub char_count: usize,
    pub paper: PaperMetadata,
}

/// Turns a stored document into a plain-text artifact.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<ExtractedText, StageError>;
}

/// Extraction through an external program invoked with `{source}` and
/// `{output}` placeholders.
pub struct CommandExtractor {
    command: CapabilityCommand,
}

impl CommandExtractor {
    pub fn new(command: CapabilityCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<ExtractedText, StageError> {
        // A leftover artifact from an interrupted run must not pass as output.
        remove_if_present(request.output_path).await;
        remove_if_present(&metadata_sidecar_path(request.output_path)).await;

        self.command
            .run_checked(&[
                ("source", request.source_path),
                ("output", request.output_path),
            ])
            .await?;

        read_text_artifact(request.output_path).await
    }
}

/// Validates an extraction artifact and picks up the optional metadata
/// sidecar written next to it.
pub async fn read_text_artifact(path: &Path) -> Result<ExtractedText, StageError> {
    let text = match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StageError::MissingOutput(path.to_path_buf()));
        }
        Err(e) => {
            return Err(StageError::ReadOutput {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    if text.trim().is_empty() {
        return Err(StageError::EmptyOutput(path.to_path_buf()));
    }

    Ok(ExtractedText {
        path: path.to_path_buf(),
        char_count: text.chars().count(),
        paper: read_sidecar(&metadata_sidecar_path(path)).await,
    })
}

#[derive(Deserialize)]
struct Sidecar {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
}

async fn read_sidecar(path: &Path) -> PaperMetadata {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(_) => return PaperMetadata::default(),
    };
    match serde_json::from_slice::<Sidecar>(&bytes) {
        Ok(sidecar) => PaperMetadata {
            title: non_blank(sidecar.title),
            abstract_text: non_blank(sidecar.abstract_text),
        },
        Err(e) => {
            log::warn!("Ignoring malformed metadata sidecar {:?}: {}", path, e);
            PaperMetadata::default()
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove stale artifact {:?}: {}", path, e);
        }
    }
}
