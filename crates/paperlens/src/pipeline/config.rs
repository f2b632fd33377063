use std::path::PathBuf;
use std::time::Duration;

use crate::config::schema::DEFAULT_MAX_UPLOAD_BYTES;
use crate::config::{Config, RecoveryPolicy};

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(900);

pub struct PipelineConfig {
    pub data_directory: PathBuf,
    pub worker_count: usize,
    pub max_upload_bytes: u64,
    /// `None` means no deadline.
    pub extraction_timeout: Option<Duration>,
    pub analysis_timeout: Option<Duration>,
    pub recovery: RecoveryPolicy,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(data_directory: P) -> Self {
        Self {
            data_directory: data_directory.into(),
            worker_count: num_cpus::get().max(1),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            extraction_timeout: Some(DEFAULT_EXTRACTION_TIMEOUT),
            analysis_timeout: Some(DEFAULT_ANALYSIS_TIMEOUT),
            recovery: RecoveryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            data_directory: config.data_dir(),
            worker_count: config.worker_count.max(1),
            max_upload_bytes: config.max_upload_bytes,
            extraction_timeout: stage_timeout(
                config.extraction.timeout_secs,
                DEFAULT_EXTRACTION_TIMEOUT,
            ),
            analysis_timeout: stage_timeout(
                config.analysis.command.timeout_secs,
                DEFAULT_ANALYSIS_TIMEOUT,
            ),
            recovery: config.recovery,
        }
    }
}

fn stage_timeout(secs: Option<u64>, default: Duration) -> Option<Duration> {
    match secs {
        None => Some(default),
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
    }
}
