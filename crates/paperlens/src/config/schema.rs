use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::expand_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    pub data_directory: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
    pub extraction: CommandConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub topics: Vec<TopicSeed>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Data directory with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.data_directory))
    }

    /// Database file: `databasePath` if set, else `<dataDirectory>/paperlens.db`.
    pub fn database_file(&self) -> PathBuf {
        match self.database_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(expand_home(path)),
            None => self.data_dir().join("paperlens.db"),
        }
    }
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

/// 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What to do at startup with jobs a previous process left unfinished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Mark them `failed` with an "interrupted" reason.
    #[default]
    Fail,
    /// Run the pipeline again from extraction.
    Resume,
}

/// An external capability invoked as a child process.
///
/// `args` are templates: `{source}`, `{output}`, `{text}` and `{topics}` are
/// replaced with artifact paths when the stage runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Stage deadline in seconds. Unset uses the stage default, `0` disables it.
    /// The analysis deadline spans the fallback attempt; a fallback may not
    /// set its own.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub env: Vec<EnvVarConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(flatten)]
    pub command: CommandConfig,
    /// Tried when the primary command fails.
    #[serde(default)]
    pub fallback: Option<CommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarConfig {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_file: Option<String>,
    #[serde(default)]
    pub value_env_var: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSeed {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Document formats the extraction capability understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Maps a declared MIME type (parameters such as `; charset=utf-8` are
    /// ignored) to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "text/plain" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "txt",
        }
    }

    /// Canonical MIME type, as guessed from the extension.
    pub fn mime_type(&self) -> String {
        mime_guess::from_ext(self.extension())
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}
