use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::analysis::AnalysisResult;
use crate::config::{Config, DocumentFormat, RecoveryPolicy};
use crate::db::Database;
use crate::error::{DeleteError, SubmitError, ValidationError, WaitError};
use crate::pipeline::{
    Analyzer, CapabilityCommand, CommandAnalyzer, CommandExtractor, Extractor, Pipeline,
    PipelineConfig, PipelineContext,
};
use crate::registry::{JobListResponse, JobQuery, JobRegistry, ReadError, RegistryError};
use crate::sanitize;
use crate::storage::DocumentStore;
use crate::taxonomy::{TopicCatalog, TopicProvider};

use super::job::{DocumentJob, JobStage, JobStatus, Stage, SubmitMetadata};

/// Reason recorded on jobs a previous process left unfinished.
pub const INTERRUPTED_REASON: &str = "interrupted before completion";

/// Client-side polling policy for waiting on a job.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub failed: usize,
    pub resumed: usize,
}

/// Accepts submissions and runs each job's pipeline in the background.
///
/// Cloning is cheap; all clones share the same in-flight set, worker
/// permits and task tracker.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<PipelineConfig>,
    pipeline: Pipeline,
    registry: Arc<JobRegistry>,
    store: Arc<DocumentStore>,
    permits: Semaphore,
    /// Jobs with a live pipeline task. At most one per id.
    in_flight: Mutex<HashSet<String>>,
    tracker: TaskTracker,
    shutting_down: AtomicBool,
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("In-flight set lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Releases a job's in-flight slot when its task ends, however it ends.
struct InFlightGuard {
    inner: Arc<Inner>,
    job_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_in_flight().remove(&self.job_id);
    }
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<JobRegistry>,
        store: Arc<DocumentStore>,
        topics: Arc<dyn TopicProvider>,
        extractor: Arc<dyn Extractor>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let config = Arc::new(config);
        let worker_count = config.worker_count.max(1);
        let pipeline = Pipeline::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            Arc::clone(&store),
            topics,
            extractor,
            analyzer,
        );

        info!("Orchestrator ready with {} workers", worker_count);

        Self {
            inner: Arc::new(Inner {
                config,
                pipeline,
                registry,
                store,
                permits: Semaphore::new(worker_count),
                in_flight: Mutex::new(HashSet::new()),
                tracker: TaskTracker::new(),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Production constructor: opens the database, prepares the document
    /// store, seeds the topic catalog and builds the command stages.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let pipeline_config = PipelineConfig::from_config(config);

        let store = DocumentStore::new(&pipeline_config.data_directory);
        store.prepare()?;

        let db = Database::open(&config.database_file())?;
        let registry = Arc::new(JobRegistry::new(db.clone()));

        let catalog = TopicCatalog::new(db);
        catalog.seed_if_empty(&config.topics)?;

        let extractor = CommandExtractor::new(CapabilityCommand::from_config(&config.extraction)?);
        let fallback = config
            .analysis
            .fallback
            .as_ref()
            .map(CapabilityCommand::from_config)
            .transpose()?;
        let analyzer = CommandAnalyzer::new(
            CapabilityCommand::from_config(&config.analysis.command)?,
            fallback,
        );

        Ok(Self::new(
            pipeline_config,
            registry,
            Arc::new(store),
            Arc::new(catalog),
            Arc::new(extractor),
            Arc::new(analyzer),
        ))
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &DocumentStore {
        &self.inner.store
    }

    /// Validates and stores a document, registers the job and starts its
    /// pipeline without waiting for it. Returns the new job id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(
        &self,
        owner_id: &str,
        content: &[u8],
        metadata: SubmitMetadata,
    ) -> Result<String, SubmitError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }

        let format = validate_submission(
            owner_id,
            content,
            &metadata,
            self.inner.config.max_upload_bytes,
        )?;
        let handle = Handle::try_current().map_err(|_| SubmitError::NoRuntime)?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let filename = sanitize::sanitize_filename(&metadata.filename, format.extension());
        let source_path = self
            .inner
            .store
            .store_document(&job_id, &filename, content)?;

        let job = DocumentJob::with_id(
            job_id.clone(),
            owner_id,
            filename,
            format,
            metadata.mime_type.filter(|m| !m.trim().is_empty()),
            content.len() as u64,
            source_path,
        );
        if let Err(e) = self.inner.registry.create(&job) {
            self.remove_artifacts(&job_id);
            return Err(e.into());
        }

        let job = self.inner.registry.mark_processing(&job_id)?;
        info!(
            "Accepted job {} ({}, {} bytes) for owner {}",
            job_id,
            format.as_str(),
            job.size_bytes,
            sanitize::fingerprint(owner_id)
        );

        self.launch(&handle, job);
        Ok(job_id)
    }

    /// Spawns the pipeline task unless one is already running for the job.
    fn launch(&self, handle: &Handle, job: DocumentJob) -> bool {
        if !self.inner.lock_in_flight().insert(job.id.clone()) {
            debug!("Job {} already has a running pipeline", job.id);
            return false;
        }
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            job_id: job.id.clone(),
        };

        let inner = Arc::clone(&self.inner);
        self.inner.tracker.spawn_on(
            async move {
                let _guard = guard;
                let _permit = match inner.permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!("Worker permits closed; job {} not started", job.id);
                        return;
                    }
                };
                let outcome = inner.pipeline.run(PipelineContext::new(job)).await;
                debug!("Pipeline finished: {:?}", outcome);
            },
            handle,
        );
        true
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    pub fn get_status(&self, job_id: &str, owner_id: &str) -> Result<JobStatus, ReadError> {
        self.inner.registry.get_status(job_id, owner_id)
    }

    pub fn get_result(&self, job_id: &str, owner_id: &str) -> Result<AnalysisResult, ReadError> {
        self.inner.registry.get_result(job_id, owner_id)
    }

    pub fn get_job(&self, job_id: &str, owner_id: &str) -> Result<DocumentJob, ReadError> {
        self.inner.registry.get_job(job_id, owner_id)
    }

    pub fn list_jobs(
        &self,
        owner_id: &str,
        query: &JobQuery,
    ) -> Result<JobListResponse, RegistryError> {
        self.inner.registry.list_jobs(owner_id, query)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    /// Polls until the job is terminal or the policy gives up.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        owner_id: &str,
        policy: PollPolicy,
    ) -> Result<DocumentJob, WaitError> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.inner.registry.get_job(job_id, owner_id) {
                Ok(job) if job.status.is_terminal() => return Ok(job),
                Ok(_) | Err(ReadError::NotReady { .. }) => {}
                Err(ReadError::NotFound) => return Err(WaitError::NotFound),
                Err(ReadError::Registry(e)) => return Err(e.into()),
            }
            if attempt < attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(WaitError::TimedOut { attempts })
    }

    /// Like [`wait_for_terminal`](Self::wait_for_terminal), but when the
    /// policy gives up the orchestrator is drained so the job still reaches a
    /// terminal state before this returns. Later submissions are refused.
    pub async fn wait_or_drain(
        &self,
        job_id: &str,
        owner_id: &str,
        policy: PollPolicy,
    ) -> Result<DocumentJob, WaitError> {
        match self.wait_for_terminal(job_id, owner_id, policy).await {
            Err(WaitError::TimedOut { attempts }) => {
                warn!(
                    "Job {} still running after {} polls; waiting for it to finish",
                    job_id, attempts
                );
                self.drain().await;
                self.inner
                    .registry
                    .get_job(job_id, owner_id)
                    .map_err(|e| match e {
                        ReadError::Registry(e) => WaitError::Registry(e),
                        ReadError::NotFound | ReadError::NotReady { .. } => WaitError::NotFound,
                    })
            }
            other => other,
        }
    }

    // ─── Deletion ───────────────────────────────────────────────────────────

    /// Removes a job, its result and its artifacts. Refused while the job's
    /// pipeline is running.
    pub fn delete_job(&self, job_id: &str, owner_id: &str) -> Result<(), DeleteError> {
        {
            // Held across the delete so the job cannot be launched meanwhile.
            let in_flight = self.inner.lock_in_flight();
            if self.inner.registry.get_job(job_id, owner_id).is_ok() && in_flight.contains(job_id) {
                return Err(DeleteError::JobBusy(job_id.to_string()));
            }
            self.inner
                .registry
                .remove(job_id, owner_id)
                .map_err(|e| match e {
                    ReadError::Registry(e) => DeleteError::Registry(e),
                    ReadError::NotFound | ReadError::NotReady { .. } => DeleteError::NotFound,
                })?;
        }

        self.remove_artifacts(job_id);
        Ok(())
    }

    fn remove_artifacts(&self, job_id: &str) {
        for failure in self.inner.store.remove_job_artifacts(job_id) {
            warn!("Job {}: {}", job_id, failure);
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Applies the recovery policy to jobs a previous process left in
    /// `Uploaded` or `Processing`.
    pub fn recover(&self) -> Result<RecoveryReport, RegistryError> {
        let stranded = self.inner.registry.unfinished()?;
        let mut report = RecoveryReport::default();
        if stranded.is_empty() {
            return Ok(report);
        }

        let handle = Handle::try_current().ok();
        let policy = self.inner.config.recovery;
        info!(
            "Recovering {} unfinished jobs with policy {:?}",
            stranded.len(),
            policy
        );

        for job in stranded {
            if self.inner.lock_in_flight().contains(&job.id) {
                continue;
            }

            let job = if job.status == JobStatus::Uploaded {
                self.inner.registry.mark_processing(&job.id)?
            } else {
                job
            };

            match (policy, handle.as_ref()) {
                (RecoveryPolicy::Resume, Some(handle)) => {
                    if self.launch(handle, job) {
                        report.resumed += 1;
                    }
                }
                (RecoveryPolicy::Resume, None) => {
                    warn!("No runtime to resume job {}; marking it failed", job.id);
                    self.fail_interrupted(&job)?;
                    report.failed += 1;
                }
                (RecoveryPolicy::Fail, _) => {
                    self.fail_interrupted(&job)?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn fail_interrupted(&self, job: &DocumentJob) -> Result<(), RegistryError> {
        let stage = if job.stage == JobStage::Analyzing || job.extracted_text_path.is_some() {
            Stage::Analysis
        } else {
            Stage::Extraction
        };
        let failed = self
            .inner
            .registry
            .mark_failed(&job.id, stage, INTERRUPTED_REASON)?;
        self.inner.registry.record_stats(&failed);
        // The run that wrote it is gone.
        let snapshot = self.inner.store.topic_snapshot_path(&job.id);
        if let Err(e) = self.inner.store.remove_file(&snapshot) {
            warn!("Job {}: {}", job.id, e);
        }
        Ok(())
    }

    /// Stops accepting submissions and waits for running pipelines.
    pub async fn drain(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.inner.tracker.close();
        let running = self.in_flight_count();
        if running > 0 {
            info!("Waiting for {} running pipelines", running);
        }
        self.inner.tracker.wait().await;
    }
}

/// Checks a submission and classifies its format.
///
/// A recognised extension decides the format; a declared MIME type must then
/// agree with it. Without a usable extension the declared MIME type decides.
/// `application/octet-stream` counts as undeclared.
pub fn validate_submission(
    owner_id: &str,
    content: &[u8],
    metadata: &SubmitMetadata,
    max_bytes: u64,
) -> Result<DocumentFormat, ValidationError> {
    if owner_id.trim().is_empty() {
        return Err(ValidationError::MissingOwner);
    }
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = content.len() as u64;
    if size > max_bytes {
        return Err(ValidationError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let extension = Path::new(metadata.filename.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .filter(|e| !e.is_empty());
    let mime = metadata
        .mime_type
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("application/octet-stream"));

    match (extension, mime) {
        (Some(ext), mime) => {
            let format = DocumentFormat::from_extension(&ext)
                .ok_or_else(|| ValidationError::UnsupportedType(format!(".{}", ext)))?;
            if let Some(mime) = mime {
                if DocumentFormat::from_mime(mime) != Some(format) {
                    return Err(ValidationError::TypeMismatch {
                        extension: ext,
                        mime_type: mime.to_string(),
                    });
                }
            }
            Ok(format)
        }
        (None, Some(mime)) => DocumentFormat::from_mime(mime)
            .ok_or_else(|| ValidationError::UnsupportedType(mime.to_string())),
        (None, None) => Err(ValidationError::UnsupportedType(
            metadata.filename.clone(),
        )),
    }
}
