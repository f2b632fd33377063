use std::path::PathBuf;
use std::time::Instant;

use crate::analysis::AnalysisResult;
use crate::taxonomy::TopicSnapshot;
use crate::worker::job::DocumentJob;

use super::extract::ExtractedText;

pub struct PipelineContext {
    // Input
    pub job: DocumentJob,

    // Extraction result, Some after step_extract
    pub extracted: Option<ExtractedText>,

    // Taxonomy snapshot, Some after step_snapshot_topics
    pub snapshot: Option<TopicSnapshot>,
    pub snapshot_path: Option<PathBuf>,

    // Analysis result, Some after step_analyze
    pub result: Option<AnalysisResult>,

    pub started: Instant,
}

impl PipelineContext {
    pub fn new(job: DocumentJob) -> Self {
        Self {
            job,
            extracted: None,
            snapshot: None,
            snapshot_path: None,
            result: None,
            started: Instant::now(),
        }
    }
}
