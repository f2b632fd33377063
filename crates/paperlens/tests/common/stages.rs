//! Scripted pipeline stages.
//!
//! Each stage writes a real artifact where the pipeline expects one and then
//! validates it with the same readers the command stages use, so the
//! pipeline's artifact handling is exercised without child processes.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use paperlens::analysis::AnalysisResult;
use paperlens::pipeline::analyze::read_analysis_artifact;
use paperlens::pipeline::extract::read_text_artifact;
use paperlens::pipeline::{
    AnalysisRequest, Analyzer, ExtractedText, ExtractionRequest, Extractor, StageError,
};

/// Tracks how many calls are running at once.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub enum ExtractBehavior {
    /// Copies the stored document to the output path.
    CopySource,
    /// Like `CopySource`, plus a metadata sidecar.
    CopyWithSidecar(String),
    /// Exits non-zero with these diagnostics.
    Fail(String),
    /// Succeeds without writing anything.
    NoOutput,
    /// Writes only whitespace.
    Blank,
    /// Sleeps before copying.
    Slow(Duration),
    /// Waits for a permit on the gate before copying.
    Gated(Arc<Semaphore>),
}

pub struct ScriptedExtractor {
    behavior: ExtractBehavior,
    calls: AtomicUsize,
    pub concurrency: Concurrency,
}

impl ScriptedExtractor {
    pub fn new(behavior: ExtractBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            concurrency: Concurrency::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, request: &ExtractionRequest<'_>) -> Result<ExtractedText, StageError> {
        match &self.behavior {
            ExtractBehavior::Fail(diagnostics) => {
                return Err(StageError::ExitFailure {
                    program: "scripted-extractor".to_string(),
                    status: "exit status: 1".to_string(),
                    diagnostics: diagnostics.clone(),
                });
            }
            ExtractBehavior::NoOutput => {}
            ExtractBehavior::Blank => {
                std::fs::write(request.output_path, "  \n ").unwrap();
            }
            ExtractBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                std::fs::copy(request.source_path, request.output_path).unwrap();
            }
            ExtractBehavior::Gated(gate) => {
                let _permit = gate.acquire().await.unwrap();
                std::fs::copy(request.source_path, request.output_path).unwrap();
            }
            ExtractBehavior::CopySource => {
                std::fs::copy(request.source_path, request.output_path).unwrap();
            }
            ExtractBehavior::CopyWithSidecar(sidecar) => {
                std::fs::copy(request.source_path, request.output_path).unwrap();
                let sidecar_path = paperlens::storage::metadata_sidecar_path(request.output_path);
                std::fs::write(sidecar_path, sidecar).unwrap();
            }
        }
        read_text_artifact(request.output_path).await
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, request: ExtractionRequest<'_>) -> Result<ExtractedText, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.concurrency.enter();
        let result = self.run(&request).await;
        self.concurrency.exit();
        result
    }
}

#[derive(Clone)]
pub enum AnalyzeBehavior {
    /// Writes this JSON as the analysis output.
    Json(String),
    /// Exits non-zero.
    Fail(String),
    /// Sleeps, then writes the JSON.
    Slow(Duration, String),
}

/// What the analyzer was handed on one call.
#[derive(Debug, Clone)]
pub struct AnalyzeCall {
    pub job_id: String,
    pub text: String,
    pub snapshot_topics: Vec<String>,
    pub snapshot_file: String,
}

pub struct ScriptedAnalyzer {
    behavior: AnalyzeBehavior,
    calls: Mutex<Vec<AnalyzeCall>>,
}

impl ScriptedAnalyzer {
    pub fn new(behavior: AnalyzeBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<AnalyzeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisResult, StageError> {
        self.calls.lock().unwrap().push(AnalyzeCall {
            job_id: request.job_id.to_string(),
            text: std::fs::read_to_string(request.text_path).unwrap_or_default(),
            snapshot_topics: request
                .snapshot
                .topics
                .iter()
                .map(|t| t.name.clone())
                .collect(),
            snapshot_file: std::fs::read_to_string(request.snapshot_path).unwrap_or_default(),
        });

        let json = match &self.behavior {
            AnalyzeBehavior::Fail(diagnostics) => {
                return Err(StageError::ExitFailure {
                    program: "scripted-analyzer".to_string(),
                    status: "exit status: 1".to_string(),
                    diagnostics: diagnostics.clone(),
                });
            }
            AnalyzeBehavior::Json(json) => json.clone(),
            AnalyzeBehavior::Slow(delay, json) => {
                tokio::time::sleep(*delay).await;
                json.clone()
            }
        };

        std::fs::write(request.output_path, json).unwrap();
        read_analysis_artifact(request.output_path, request.job_id, request.snapshot).await
    }
}
