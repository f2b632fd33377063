use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::registry::JobRegistry;
use crate::sanitize;
use crate::storage::DocumentStore;
use crate::taxonomy::{TopicProvider, TopicSnapshot};
use crate::worker::job::{JobStage, Stage};

use super::analyze::{AnalysisRequest, Analyzer};
use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, StageError};
use super::extract::{ExtractionRequest, Extractor};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Analyzed { result_id: String },
    Failed { stage: Stage },
    /// The registry refused the terminal write, e.g. the job was deleted.
    Abandoned,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    registry: Arc<JobRegistry>,
    store: Arc<DocumentStore>,
    topics: Arc<dyn TopicProvider>,
    extractor: Arc<dyn Extractor>,
    analyzer: Arc<dyn Analyzer>,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        registry: Arc<JobRegistry>,
        store: Arc<DocumentStore>,
        topics: Arc<dyn TopicProvider>,
        extractor: Arc<dyn Extractor>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            topics,
            extractor,
            analyzer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs extraction then analysis for a job already in `Processing`,
    /// and records the terminal state. Never returns an error: every stage
    /// failure ends as `Failed` in the registry.
    pub async fn run(&self, ctx: PipelineContext) -> JobOutcome {
        let span = info_span!("pipeline",
            job_id = %ctx.job.id,
            filename = %sanitize::redact_path(&ctx.job.source_path),
            format = ctx.job.format.as_str(),
        );
        self.run_inner(ctx).instrument(span).await
    }

    async fn run_inner(&self, mut ctx: PipelineContext) -> JobOutcome {
        let outcome = match self.execute(&mut ctx).await {
            Ok(result_id) => {
                info!(
                    job_id = %ctx.job.id,
                    elapsed_ms = ctx.started.elapsed().as_millis() as u64,
                    "Document analyzed"
                );
                JobOutcome::Analyzed { result_id }
            }
            Err(e) => self.fail(&mut ctx, e),
        };

        self.cleanup(&ctx);
        if ctx.job.status.is_terminal() {
            self.registry.record_stats(&ctx.job);
        }
        outcome
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<String, PipelineError> {
        self.step_extract(ctx)
            .instrument(info_span!("extract"))
            .await?;

        info_span!("snapshot_topics").in_scope(|| self.step_snapshot_topics(ctx))?;

        self.step_analyze(ctx)
            .instrument(info_span!("analyze"))
            .await?;

        info_span!("commit").in_scope(|| self.step_commit(ctx))
    }

    async fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        ctx.job = self.registry.set_stage(&ctx.job.id, JobStage::Extracting)?;

        let output_path = self.store.extracted_text_path(&ctx.job.id);
        let request = ExtractionRequest {
            job_id: &ctx.job.id,
            source_path: &ctx.job.source_path,
            output_path: &output_path,
        };
        let extracted = with_deadline(
            self.config.extraction_timeout,
            self.extractor.extract(request),
        )
        .await
        .map_err(PipelineError::Extraction)?;

        debug!(
            chars = extracted.char_count,
            has_title = extracted.paper.title.is_some(),
            "Extraction finished"
        );

        ctx.job = self.registry.record_extraction(
            &ctx.job.id,
            &extracted.path,
            extracted.paper.clone(),
        )?;
        ctx.extracted = Some(extracted);
        Ok(())
    }

    fn step_snapshot_topics(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        ctx.job = self.registry.set_stage(&ctx.job.id, JobStage::Analyzing)?;

        let snapshot_error = |e: String| PipelineError::Analysis(StageError::Snapshot(e));
        let snapshot =
            TopicSnapshot::take(self.topics.as_ref()).map_err(|e| snapshot_error(e.to_string()))?;
        let json = snapshot
            .to_json()
            .map_err(|e| snapshot_error(e.to_string()))?;

        let path = self.store.topic_snapshot_path(&ctx.job.id);
        // Set before writing so a partial file is still cleaned up.
        ctx.snapshot_path = Some(path.clone());
        self.store
            .write_scratch(&path, &json)
            .map_err(|e| snapshot_error(e.to_string()))?;

        debug!(topics = snapshot.len(), "Topic snapshot taken");
        ctx.snapshot = Some(snapshot);
        Ok(())
    }

    async fn step_analyze(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let (Some(extracted), Some(snapshot), Some(snapshot_path)) =
            (&ctx.extracted, &ctx.snapshot, &ctx.snapshot_path)
        else {
            return Err(PipelineError::Analysis(StageError::Snapshot(
                "analysis started before extraction".to_string(),
            )));
        };

        let output_path = self.store.analysis_output_path(&ctx.job.id);
        let request = AnalysisRequest {
            job_id: &ctx.job.id,
            text_path: &extracted.path,
            output_path: &output_path,
            snapshot,
            snapshot_path,
        };
        let result = with_deadline(self.config.analysis_timeout, self.analyzer.analyze(request))
            .await
            .map_err(PipelineError::Analysis)?;

        debug!(
            extracted_topics = result.extracted_topics.len(),
            suggested_topics = result.suggested_topics.len(),
            "Analysis finished"
        );
        ctx.result = Some(result);
        Ok(())
    }

    fn step_commit(&self, ctx: &mut PipelineContext) -> Result<String, PipelineError> {
        let Some(result) = ctx.result.as_ref() else {
            return Err(PipelineError::Analysis(StageError::MissingOutput(
                self.store.analysis_output_path(&ctx.job.id),
            )));
        };
        ctx.job = self.registry.complete(&ctx.job.id, result)?;
        Ok(result.id.clone())
    }

    fn fail(&self, ctx: &mut PipelineContext, err: PipelineError) -> JobOutcome {
        let stage = match &err {
            PipelineError::Extraction(_) => Stage::Extraction,
            PipelineError::Analysis(_) => Stage::Analysis,
            _ if ctx.extracted.is_some() => Stage::Analysis,
            _ => Stage::Extraction,
        };
        let diagnostics = err
            .stage_error()
            .and_then(StageError::diagnostics)
            .unwrap_or("");

        error!(
            job_id = %ctx.job.id,
            stage = stage.as_str(),
            error = %err,
            diagnostics = diagnostics,
            "Pipeline stage failed"
        );

        let message = if diagnostics.is_empty() {
            err.to_string()
        } else {
            format!("{}\n{}", err, diagnostics)
        };

        match self.registry.mark_failed(&ctx.job.id, stage, &message) {
            Ok(job) => {
                ctx.job = job;
                JobOutcome::Failed { stage }
            }
            Err(e) => {
                warn!(job_id = %ctx.job.id, error = %e, "Could not record failure");
                JobOutcome::Abandoned
            }
        }
    }

    fn cleanup(&self, ctx: &PipelineContext) {
        if let Some(path) = &ctx.snapshot_path {
            if let Err(e) = self.store.remove_file(path) {
                warn!(job_id = %ctx.job.id, error = %e, "Failed to remove topic snapshot");
            }
        }
    }
}

/// Bounds a stage future. Dropping the future on timeout kills its child
/// process.
async fn with_deadline<F, T>(limit: Option<Duration>, stage: F) -> Result<T, StageError>
where
    F: Future<Output = Result<T, StageError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, stage)
            .await
            .map_err(|_| StageError::TimedOut(limit))?,
        None => stage.await,
    }
}
