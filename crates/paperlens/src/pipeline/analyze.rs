use std::path::Path;

use async_trait::async_trait;

use crate::analysis::{parse_analysis_output, AnalysisResult};
use crate::taxonomy::TopicSnapshot;

use super::command::CapabilityCommand;
use super::error::StageError;

pub struct AnalysisRequest<'a> {
    pub job_id: &'a str,
    pub text_path: &'a Path,
    pub output_path: &'a Path,
    pub snapshot: &'a TopicSnapshot,
    /// The snapshot serialized for the capability to read.
    pub snapshot_path: &'a Path,
}

/// Produces a summary and topics from extracted text.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisResult, StageError>;
}

/// Analysis through external programs invoked with `{text}`, `{output}` and
/// `{topics}` placeholders. Commands are tried in order; the stage fails only
/// when every one of them fails.
pub struct CommandAnalyzer {
    commands: Vec<CapabilityCommand>,
}

impl CommandAnalyzer {
    pub fn new(primary: CapabilityCommand, fallback: Option<CapabilityCommand>) -> Self {
        let mut commands = vec![primary];
        commands.extend(fallback);
        Self { commands }
    }

    async fn run_one(
        &self,
        command: &CapabilityCommand,
        request: &AnalysisRequest<'_>,
    ) -> Result<AnalysisResult, StageError> {
        if let Err(e) = tokio::fs::remove_file(request.output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove stale analysis output: {}", e);
            }
        }

        command
            .run_checked(&[
                ("text", request.text_path),
                ("output", request.output_path),
                ("topics", request.snapshot_path),
            ])
            .await?;

        read_analysis_artifact(request.output_path, request.job_id, request.snapshot).await
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisResult, StageError> {
        let mut last_error = None;
        for (attempt, command) in self.commands.iter().enumerate() {
            match self.run_one(command, &request).await {
                Ok(result) => {
                    if attempt > 0 {
                        log::info!(
                            "Job {}: analysis succeeded with fallback '{}'",
                            request.job_id,
                            command.program()
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if attempt + 1 < self.commands.len() {
                        log::warn!(
                            "Job {}: analyzer '{}' failed, trying fallback: {}",
                            request.job_id,
                            command.program(),
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| StageError::MissingOutput(request.output_path.to_path_buf())))
    }
}

/// Reads and normalizes an analysis artifact.
pub async fn read_analysis_artifact(
    path: &Path,
    job_id: &str,
    snapshot: &TopicSnapshot,
) -> Result<AnalysisResult, StageError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
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
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StageError::EmptyOutput(path.to_path_buf()));
    }

    parse_analysis_output(&bytes, job_id, snapshot).map_err(|e| StageError::MalformedOutput {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
