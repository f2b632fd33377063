use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DocumentFormat;

/// Lifecycle status of a document job.
///
/// ```text
/// Uploaded -> Processing -> Analyzed | Failed
/// ```
///
/// `Analyzed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Analyzed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Analyzed => "analyzed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "analyzed" => Some(Self::Analyzed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Analyzed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer-grained progress within the status, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Queued,
    Extracting,
    Analyzing,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "extracting" => Some(Self::Extracting),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A pipeline stage, as recorded when a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extraction,
    Analysis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Analysis => "analysis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "extraction" => Some(Self::Extraction),
            "analysis" => Some(Self::Analysis),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bibliographic fields the extractor may report alongside the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        rename = "abstract",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,
}

impl PaperMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.abstract_text.is_none()
    }
}

/// What the caller declares about an upload.
#[derive(Debug, Clone)]
pub struct SubmitMetadata {
    pub filename: String,
    pub mime_type: Option<String>,
}

impl SubmitMetadata {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// The durable record of one submitted document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentJob {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    pub source_path: PathBuf,
    /// Set once extraction succeeds; kept if analysis later fails.
    pub extracted_text_path: Option<PathBuf>,
    pub status: JobStatus,
    pub stage: JobStage,
    /// Set iff `status == Analyzed`.
    pub result_id: Option<String>,
    pub failed_stage: Option<Stage>,
    /// Operator diagnostics. Never returned by status or result reads.
    pub error: Option<String>,
    pub paper: PaperMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentJob {
    /// A freshly uploaded job with a new random id.
    pub fn new(
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        format: DocumentFormat,
        mime_type: Option<String>,
        size_bytes: u64,
        source_path: PathBuf,
    ) -> Self {
        Self::with_id(
            uuid::Uuid::new_v4().to_string(),
            owner_id,
            filename,
            format,
            mime_type,
            size_bytes,
            source_path,
        )
    }

    pub fn with_id(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        filename: impl Into<String>,
        format: DocumentFormat,
        mime_type: Option<String>,
        size_bytes: u64,
        source_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            filename: filename.into(),
            format,
            mime_type,
            size_bytes,
            source_path,
            extracted_text_path: None,
            status: JobStatus::Uploaded,
            stage: JobStage::Queued,
            result_id: None,
            failed_stage: None,
            error: None,
            paper: PaperMetadata::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }

    /// The result link is present exactly when the job is analyzed.
    pub fn result_link_consistent(&self) -> bool {
        self.result_id.is_some() == (self.status == JobStatus::Analyzed)
    }

    /// Caller-facing projection without diagnostics or storage paths.
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id.clone(),
            filename: self.filename.clone(),
            format: self.format,
            size_bytes: self.size_bytes,
            status: self.status,
            stage: self.stage,
            result_id: self.result_id.clone(),
            title: self.paper.title.clone(),
            abstract_text: self.paper.abstract_text.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub filename: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
    pub status: JobStatus,
    pub stage: JobStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
