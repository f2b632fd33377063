//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` struct provides:
//! - A temporary data directory with the document store layout
//! - An in-memory database shared by the registry and topic catalog
//! - Scripted stages whose invocations can be inspected afterwards

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use paperlens::config::RecoveryPolicy;
use paperlens::db::Database;
use paperlens::pipeline::PipelineConfig;
use paperlens::registry::JobRegistry;
use paperlens::storage::DocumentStore;
use paperlens::taxonomy::{Topic, TopicCatalog};
use paperlens::worker::{DocumentJob, Orchestrator, PollPolicy, SubmitMetadata};

use super::stages::{AnalyzeBehavior, ExtractBehavior, ScriptedAnalyzer, ScriptedExtractor};

pub const OWNER: &str = "owner-1";

/// Analyzer output resembling the local topic analyzer's.
pub const LOCAL_ANALYSIS: &str = r#"{
    "summary": "We propose a graph neural network for molecule property prediction.",
    "extractedTopics": [
        {"topic": "graph neural networks", "relevanceScore": 0.91, "keywords": ["graph", "message passing", "graph"]},
        {"topic": "chemistry", "relevanceScore": 0.47, "keywords": ["molecule"]}
    ],
    "suggestedTopics": [
        {"topicId": "", "topicName": "machine learning", "suggestionScore": 0.8}
    ],
    "analysisDate": "2026-03-01T12:00:00"
}"#;

/// Settings a test can change before the orchestrator is built.
pub struct HarnessOptions {
    pub extract: ExtractBehavior,
    pub analyze: AnalyzeBehavior,
    pub worker_count: usize,
    pub max_upload_bytes: u64,
    pub extraction_timeout: Option<Duration>,
    pub analysis_timeout: Option<Duration>,
    pub recovery: RecoveryPolicy,
    pub topics: Vec<&'static str>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            extract: ExtractBehavior::CopySource,
            analyze: AnalyzeBehavior::Json(LOCAL_ANALYSIS.to_string()),
            worker_count: 4,
            max_upload_bytes: 1024 * 1024,
            extraction_timeout: Some(Duration::from_secs(10)),
            analysis_timeout: Some(Duration::from_secs(10)),
            recovery: RecoveryPolicy::Fail,
            topics: vec!["Machine Learning", "Databases"],
        }
    }
}

/// Test harness providing an isolated orchestrator for integration tests.
pub struct TestHarness {
    temp_dir: TempDir,
    pub data_dir: PathBuf,
    pub db: Database,
    pub registry: Arc<JobRegistry>,
    pub store: Arc<DocumentStore>,
    pub catalog: TopicCatalog,
    pub extractor: Arc<ScriptedExtractor>,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness with stages that always succeed.
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_stages(extract: ExtractBehavior, analyze: AnalyzeBehavior) -> Self {
        Self::with_options(HarnessOptions {
            extract,
            analyze,
            ..Default::default()
        })
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_in_memory().expect("Failed to open database");
        Self::build(temp_dir, db, options)
    }

    fn build(temp_dir: TempDir, db: Database, options: HarnessOptions) -> Self {
        let data_dir = temp_dir.path().join("data");

        let store = Arc::new(DocumentStore::new(&data_dir));
        store.prepare().expect("Failed to prepare document store");

        let catalog = TopicCatalog::new(db.clone());
        for name in &options.topics {
            if paperlens::db::topic_repo::find_by_name(&db, name)
                .unwrap()
                .is_none()
            {
                catalog.add(name, "").expect("Failed to add topic");
            }
        }

        let registry = Arc::new(JobRegistry::new(db.clone()));
        let extractor = Arc::new(ScriptedExtractor::new(options.extract.clone()));
        let analyzer = Arc::new(ScriptedAnalyzer::new(options.analyze.clone()));

        let mut config = PipelineConfig::new(&data_dir);
        config.worker_count = options.worker_count;
        config.max_upload_bytes = options.max_upload_bytes;
        config.extraction_timeout = options.extraction_timeout;
        config.analysis_timeout = options.analysis_timeout;
        config.recovery = options.recovery;

        let orchestrator = Orchestrator::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::new(catalog.clone()),
            extractor.clone(),
            analyzer.clone(),
        );

        Self {
            temp_dir,
            data_dir,
            db,
            registry,
            store,
            catalog,
            extractor,
            analyzer,
            orchestrator,
        }
    }

    /// A second orchestrator over the same directory and database, as a
    /// restarted process would see them.
    pub fn restart(self, options: HarnessOptions) -> Self {
        let TestHarness { temp_dir, db, .. } = self;
        Self::build(temp_dir, db, options)
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn submit(&self, filename: &str, content: &[u8]) -> String {
        self.orchestrator
            .submit(OWNER, content, SubmitMetadata::new(filename))
            .expect("submit failed")
    }

    pub fn submit_text(&self, filename: &str, content: &str) -> String {
        self.submit(filename, content.as_bytes())
    }

    /// Polls quickly until the job is terminal.
    pub async fn wait(&self, job_id: &str) -> DocumentJob {
        self.orchestrator
            .wait_for_terminal(job_id, OWNER, fast_poll())
            .await
            .expect("job did not finish")
    }

    /// Number of entries under `documents/`.
    pub fn stored_document_count(&self) -> usize {
        std::fs::read_dir(self.data_dir.join("documents"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn scratch_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.data_dir.join("scratch"))
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    pub fn topic(&self, name: &str) -> Topic {
        paperlens::db::topic_repo::find_by_name(&self.db, name)
            .unwrap()
            .expect("topic exists")
            .into()
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(10),
        max_attempts: 1000,
    }
}

/// Roughly `size` bytes of paper-like plain text.
pub fn paper_text(size: usize) -> String {
    let paragraph = "Graph neural networks learn molecular representations by passing \
                     messages between atoms. We evaluate on standard benchmarks.\n";
    let mut text = String::from("Message Passing for Molecules\n\nAbstract\n");
    while text.len() < size {
        text.push_str(paragraph);
    }
    text.truncate(size);
    text
}
