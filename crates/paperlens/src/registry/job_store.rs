//! Job registry with persistent database storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::config::DocumentFormat;
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::result_repo::{self, ResultRow};
use crate::db::stats_repo::{self, ProcessingStatRow};
use crate::db::Database;
use crate::worker::job::{DocumentJob, JobStage, JobStatus, JobView, PaperMetadata, Stage};

use super::error::{ReadError, RegistryError};

// ─── Row conversion ─────────────────────────────────────────────────────────

fn parse_timestamp(s: &str, job_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Job {}: failed to parse timestamp '{}': {}", job_id, s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn corrupt(job_id: &str, reason: String) -> RegistryError {
    RegistryError::Corrupt {
        job_id: job_id.to_string(),
        reason,
    }
}

fn job_to_row(job: &DocumentJob) -> JobRow {
    JobRow {
        id: job.id.clone(),
        owner_id: job.owner_id.clone(),
        filename: job.filename.clone(),
        format: job.format.as_str().to_string(),
        mime_type: job.mime_type.clone(),
        size_bytes: i64::try_from(job.size_bytes).unwrap_or(i64::MAX),
        source_path: job.source_path.to_string_lossy().into_owned(),
        extracted_text_path: job
            .extracted_text_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        status: job.status.as_str().to_string(),
        current_stage: job.stage.as_str().to_string(),
        result_id: job.result_id.clone(),
        failed_stage: job.failed_stage.map(|s| s.as_str().to_string()),
        error: job.error.clone(),
        title: job.paper.title.clone(),
        abstract_text: job.paper.abstract_text.clone(),
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        completed_at: job.completed_at.map(format_timestamp),
    }
}

fn job_from_row(row: JobRow) -> Result<DocumentJob, RegistryError> {
    let status = JobStatus::parse(&row.status)
        .ok_or_else(|| corrupt(&row.id, format!("unknown status '{}'", row.status)))?;
    let format = DocumentFormat::parse(&row.format)
        .ok_or_else(|| corrupt(&row.id, format!("unknown format '{}'", row.format)))?;
    let stage = JobStage::parse(&row.current_stage).unwrap_or_else(|| {
        log::warn!(
            "Unknown stage '{}' for job {}, defaulting to queued",
            row.current_stage,
            row.id
        );
        JobStage::Queued
    });

    Ok(DocumentJob {
        format,
        mime_type: row.mime_type,
        size_bytes: u64::try_from(row.size_bytes).unwrap_or(0),
        source_path: PathBuf::from(row.source_path),
        extracted_text_path: row.extracted_text_path.map(PathBuf::from),
        status,
        stage,
        result_id: row.result_id,
        failed_stage: row.failed_stage.as_deref().and_then(Stage::parse),
        error: row.error,
        paper: PaperMetadata {
            title: row.title,
            abstract_text: row.abstract_text,
        },
        created_at: parse_timestamp(&row.created_at, &row.id),
        updated_at: parse_timestamp(&row.updated_at, &row.id),
        completed_at: row
            .completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, &row.id)),
        owner_id: row.owner_id,
        filename: row.filename,
        id: row.id,
    })
}

fn result_to_row(result: &AnalysisResult) -> Result<ResultRow, RegistryError> {
    Ok(ResultRow {
        id: result.id.clone(),
        job_id: result.job_id.clone(),
        summary: result.summary.clone(),
        extracted_topics: serde_json::to_string(&result.extracted_topics)?,
        suggested_topics: serde_json::to_string(&result.suggested_topics)?,
        suggested_areas: serde_json::to_string(&result.suggested_areas)?,
        analyzed_with: result.analyzed_with.clone(),
        created_at: format_timestamp(result.created_at),
    })
}

fn result_from_row(row: ResultRow) -> Result<AnalysisResult, RegistryError> {
    let decode_err = |e: serde_json::Error| corrupt(&row.job_id, format!("result JSON: {}", e));
    Ok(AnalysisResult {
        extracted_topics: serde_json::from_str(&row.extracted_topics).map_err(decode_err)?,
        suggested_topics: serde_json::from_str(&row.suggested_topics).map_err(decode_err)?,
        suggested_areas: serde_json::from_str(&row.suggested_areas).map_err(decode_err)?,
        created_at: parse_timestamp(&row.created_at, &row.job_id),
        id: row.id,
        job_id: row.job_id,
        summary: row.summary,
        analyzed_with: row.analyzed_with,
    })
}

// ─── Query types ────────────────────────────────────────────────────────────

/// Filters for listing an owner's jobs.
#[derive(Debug, Default, Clone)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Response for job listing with pagination.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub uploaded: u64,
    pub processing: u64,
    pub analyzed: u64,
    pub failed: u64,
}

// ─── JobRegistry ────────────────────────────────────────────────────────────

/// Persistent job registry backed by rusqlite.
///
/// Every mutation holds the job cache write lock for its whole duration, so
/// registry writers are serialized and the cache never disagrees with a
/// committed row.
pub struct JobRegistry {
    db: Database,
    jobs: RwLock<HashMap<String, DocumentJob>>,
    /// Results are immutable once stored, so entries never go stale.
    results: RwLock<HashMap<String, AnalysisResult>>,
}

impl JobRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            jobs: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, DocumentJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, DocumentJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn results_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, AnalysisResult>> {
        match self.results.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job registry result cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    // ─── Writes ─────────────────────────────────────────────────────────────

    /// Records a newly uploaded job.
    pub fn create(&self, job: &DocumentJob) -> Result<(), RegistryError> {
        if job.status != JobStatus::Uploaded || !job.result_link_consistent() {
            return Err(RegistryError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: JobStatus::Uploaded,
            });
        }

        let mut jobs = self.write_jobs();
        job_repo::insert(&self.db, &job_to_row(job))?;
        jobs.insert(job.id.clone(), job.clone());
        log::debug!("Registered job {}", job.id);
        Ok(())
    }

    /// `Uploaded -> Processing`.
    pub fn mark_processing(&self, job_id: &str) -> Result<DocumentJob, RegistryError> {
        self.transition(job_id, None, |job| {
            require_transition(job, JobStatus::Processing)?;
            job.status = JobStatus::Processing;
            job.stage = JobStage::Queued;
            Ok(())
        })
    }

    /// Records progress within `Processing`.
    pub fn set_stage(&self, job_id: &str, stage: JobStage) -> Result<DocumentJob, RegistryError> {
        self.transition(job_id, None, |job| {
            require_processing(job)?;
            job.stage = stage;
            Ok(())
        })
    }

    /// Records a successful extraction. The job stays `Processing`.
    pub fn record_extraction(
        &self,
        job_id: &str,
        text_path: &Path,
        paper: PaperMetadata,
    ) -> Result<DocumentJob, RegistryError> {
        self.transition(job_id, None, |job| {
            require_processing(job)?;
            job.extracted_text_path = Some(text_path.to_path_buf());
            job.paper = paper;
            Ok(())
        })
    }

    /// `Processing -> Failed`, keeping whatever extraction produced.
    pub fn mark_failed(
        &self,
        job_id: &str,
        stage: Stage,
        error: &str,
    ) -> Result<DocumentJob, RegistryError> {
        self.transition(job_id, None, |job| {
            require_transition(job, JobStatus::Failed)?;
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.stage = JobStage::Failed;
            job.failed_stage = Some(stage);
            job.error = Some(error.to_string());
            job.completed_at = Some(now);
            Ok(())
        })
    }

    /// `Processing -> Analyzed`. The result row and the job's link to it are
    /// written in one transaction; on any error neither is stored.
    pub fn complete(
        &self,
        job_id: &str,
        result: &AnalysisResult,
    ) -> Result<DocumentJob, RegistryError> {
        if result.job_id != job_id {
            return Err(RegistryError::ResultLink(job_id.to_string()));
        }
        let job = self.transition(job_id, Some(result), |job| {
            require_transition(job, JobStatus::Analyzed)?;
            if job.extracted_text_path.is_none() {
                return Err(RegistryError::ResultLink(job.id.clone()));
            }
            job.status = JobStatus::Analyzed;
            job.stage = JobStage::Completed;
            job.result_id = Some(result.id.clone());
            job.completed_at = Some(Utc::now());
            Ok(())
        })?;
        self.results_cache()
            .insert(job_id.to_string(), result.clone());
        Ok(job)
    }

    /// Applies `f` to the current job and persists the outcome only if the
    /// stored status has not moved underneath us.
    fn transition<F>(
        &self,
        job_id: &str,
        result: Option<&AnalysisResult>,
        f: F,
    ) -> Result<DocumentJob, RegistryError>
    where
        F: FnOnce(&mut DocumentJob) -> Result<(), RegistryError>,
    {
        let mut jobs = self.write_jobs();

        let current = match jobs.get(job_id) {
            Some(job) => job.clone(),
            None => self
                .load_job(job_id)?
                .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?,
        };

        let mut next = current.clone();
        f(&mut next)?;
        next.updated_at = Utc::now();
        if !next.result_link_consistent() {
            return Err(RegistryError::ResultLink(job_id.to_string()));
        }

        let job_row = job_to_row(&next);
        let result_row = result.map(result_to_row).transpose()?;
        let persisted = self.db.with_transaction(|conn| {
            if let Some(row) = &result_row {
                result_repo::insert(conn, row)?;
            }
            job_repo::update_if_status(conn, &job_row, current.status.as_str())
        });

        if let Err(e) = persisted {
            // The stored row may have moved; make the next read reload it.
            jobs.remove(job_id);
            return Err(e.into());
        }

        if current.status != next.status {
            log::info!("Job {}: {} -> {}", job_id, current.status, next.status);
        }
        jobs.insert(job_id.to_string(), next.clone());
        Ok(next)
    }

    /// Deletes a job and its result. Artifacts on disk are the caller's
    /// concern.
    pub fn remove(&self, job_id: &str, owner_id: &str) -> Result<DocumentJob, ReadError> {
        let job = self.get_job(job_id, owner_id)?;

        let mut jobs = self.write_jobs();
        job_repo::delete(&self.db, job_id).map_err(RegistryError::from)?;
        jobs.remove(job_id);
        self.results_cache().remove(job_id);

        log::info!("Deleted job {}", job_id);
        Ok(job)
    }

    /// Adds a finished run to the daily statistics. Failures are logged only.
    pub fn record_stats(&self, job: &DocumentJob) {
        if !job.status.is_terminal() {
            return;
        }
        let finished = job.completed_at.unwrap_or(job.updated_at);
        let duration_ms = (finished - job.created_at).num_milliseconds().max(0);
        let outcome = match (job.status, job.failed_stage) {
            (JobStatus::Analyzed, _) => "analyzed",
            (_, Some(Stage::Extraction)) => "failed_extraction",
            _ => "failed_analysis",
        };
        let date = finished.format("%Y-%m-%d").to_string();

        if let Err(e) = stats_repo::record_job_completion(
            &self.db,
            &date,
            job.format.as_str(),
            outcome,
            duration_ms,
        ) {
            log::error!("Failed to record statistics for job {}: {}", job.id, e);
        }
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    fn load_job(&self, job_id: &str) -> Result<Option<DocumentJob>, RegistryError> {
        job_repo::find_by_id(&self.db, job_id)?
            .map(job_from_row)
            .transpose()
    }

    /// Returns a job, checking the cache then the database.
    fn find(&self, job_id: &str) -> Result<Option<DocumentJob>, RegistryError> {
        if let Some(job) = self.read_jobs().get(job_id) {
            return Ok(Some(job.clone()));
        }
        let Some(job) = self.load_job(job_id)? else {
            return Ok(None);
        };
        // Never replace an entry a writer inserted while we were loading.
        let mut jobs = self.write_jobs();
        Ok(Some(
            jobs.entry(job_id.to_string()).or_insert(job).clone(),
        ))
    }

    pub fn get_job(&self, job_id: &str, owner_id: &str) -> Result<DocumentJob, ReadError> {
        match self.find(job_id)? {
            Some(job) if job.is_owned_by(owner_id) => Ok(job),
            _ => Err(ReadError::NotFound),
        }
    }

    pub fn get_status(&self, job_id: &str, owner_id: &str) -> Result<JobStatus, ReadError> {
        Ok(self.get_job(job_id, owner_id)?.status)
    }

    pub fn get_result(&self, job_id: &str, owner_id: &str) -> Result<AnalysisResult, ReadError> {
        let job = self.get_job(job_id, owner_id)?;
        let result_id = match (job.status, job.result_id) {
            (JobStatus::Analyzed, Some(id)) => id,
            (status, _) => return Err(ReadError::NotReady { status }),
        };

        if let Some(result) = self.results_cache().get(job_id) {
            return Ok(result.clone());
        }

        let row = result_repo::find_by_id(&self.db, &result_id)
            .map_err(RegistryError::from)?
            .ok_or_else(|| {
                RegistryError::Corrupt {
                    job_id: job_id.to_string(),
                    reason: format!("result {} is missing", result_id),
                }
            })?;
        let result = result_from_row(row)?;
        self.results_cache()
            .insert(job_id.to_string(), result.clone());
        Ok(result)
    }

    /// Lists an owner's jobs, newest first.
    pub fn list_jobs(
        &self,
        owner_id: &str,
        query: &JobQuery,
    ) -> Result<JobListResponse, RegistryError> {
        let filter = JobFilter {
            owner_id: Some(owner_id.to_string()),
            status: query.status.map(|s| s.as_str().to_string()),
            limit: query.limit,
            offset: query.offset,
        };
        let (rows, total) = job_repo::query(&self.db, &filter)?;
        let jobs = rows
            .into_iter()
            .map(|row| job_from_row(row).map(|job| job.view()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JobListResponse {
            jobs,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Jobs left in `Uploaded` or `Processing`, oldest first.
    pub fn unfinished(&self) -> Result<Vec<DocumentJob>, RegistryError> {
        job_repo::find_unfinished(&self.db)?
            .into_iter()
            .map(job_from_row)
            .collect()
    }

    pub fn status_counts(&self) -> Result<StatusCounts, RegistryError> {
        Ok(StatusCounts {
            uploaded: job_repo::count_by_status(&self.db, JobStatus::Uploaded.as_str())?,
            processing: job_repo::count_by_status(&self.db, JobStatus::Processing.as_str())?,
            analyzed: job_repo::count_by_status(&self.db, JobStatus::Analyzed.as_str())?,
            failed: job_repo::count_by_status(&self.db, JobStatus::Failed.as_str())?,
        })
    }

    pub fn stats(
        &self,
        from_date: Option<&str>,
        to_date: Option<&str>,
    ) -> Result<Vec<ProcessingStatRow>, RegistryError> {
        Ok(stats_repo::query(&self.db, from_date, to_date)?)
    }
}

fn require_transition(job: &DocumentJob, next: JobStatus) -> Result<(), RegistryError> {
    if job.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(RegistryError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to: next,
        })
    }
}

fn require_processing(job: &DocumentJob) -> Result<(), RegistryError> {
    if job.status == JobStatus::Processing {
        Ok(())
    } else {
        Err(RegistryError::NotProcessing {
            job_id: job.id.clone(),
            status: job.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ExtractedTopic;

    fn registry() -> JobRegistry {
        JobRegistry::new(Database::open_in_memory().unwrap())
    }

    fn uploaded(owner: &str) -> DocumentJob {
        DocumentJob::new(
            owner,
            "paper.txt",
            DocumentFormat::Text,
            Some("text/plain".to_string()),
            42,
            PathBuf::from("/data/documents/x/paper.txt"),
        )
    }

    fn result_for(job_id: &str) -> AnalysisResult {
        AnalysisResult {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            summary: "Summary".to_string(),
            extracted_topics: vec![ExtractedTopic {
                label: "ML".to_string(),
                relevance_score: 0.8,
                keywords: vec!["model".to_string()],
            }],
            suggested_topics: vec![],
            suggested_areas: vec![],
            analyzed_with: None,
            created_at: Utc::now(),
        }
    }

    fn processing(reg: &JobRegistry, owner: &str) -> DocumentJob {
        let job = uploaded(owner);
        reg.create(&job).unwrap();
        reg.mark_processing(&job.id).unwrap()
    }

    #[test]
    fn test_create_and_read_back() {
        let reg = registry();
        let job = uploaded("alice");
        reg.create(&job).unwrap();

        assert_eq!(reg.get_status(&job.id, "alice").unwrap(), JobStatus::Uploaded);
        let stored = reg.get_job(&job.id, "alice").unwrap();
        assert_eq!(stored.filename, "paper.txt");
    }

    #[test]
    fn test_happy_path_links_result() {
        let reg = registry();
        let job = processing(&reg, "alice");
        reg.record_extraction(&job.id, Path::new("/data/text/x.txt"), PaperMetadata::default())
            .unwrap();

        let result = result_for(&job.id);
        let done = reg.complete(&job.id, &result).unwrap();

        assert_eq!(done.status, JobStatus::Analyzed);
        assert_eq!(done.result_id.as_deref(), Some(result.id.as_str()));
        assert!(done.completed_at.is_some());
        assert_eq!(reg.get_result(&job.id, "alice").unwrap(), result);
    }

    #[test]
    fn test_complete_requires_extraction() {
        let reg = registry();
        let job = processing(&reg, "alice");

        let err = reg.complete(&job.id, &result_for(&job.id)).unwrap_err();
        assert!(matches!(err, RegistryError::ResultLink(_)));
        assert_eq!(result_repo::count(reg.database()).unwrap(), 0);
        assert_eq!(reg.get_status(&job.id, "alice").unwrap(), JobStatus::Processing);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let reg = registry();
        let job = processing(&reg, "alice");
        reg.mark_failed(&job.id, Stage::Extraction, "exit status 1")
            .unwrap();

        assert!(matches!(
            reg.mark_processing(&job.id),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            reg.mark_failed(&job.id, Stage::Analysis, "again"),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            reg.set_stage(&job.id, JobStage::Analyzing),
            Err(RegistryError::NotProcessing { .. })
        ));
        assert_eq!(reg.get_status(&job.id, "alice").unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_cannot_skip_processing() {
        let reg = registry();
        let job = uploaded("alice");
        reg.create(&job).unwrap();

        assert!(matches!(
            reg.mark_failed(&job.id, Stage::Extraction, "x"),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert!(matches!(
            reg.record_extraction(&job.id, Path::new("/t"), PaperMetadata::default()),
            Err(RegistryError::NotProcessing { .. })
        ));
    }

    #[test]
    fn test_failed_analysis_keeps_text_path() {
        let reg = registry();
        let job = processing(&reg, "alice");
        let paper = PaperMetadata {
            title: Some("On Things".to_string()),
            abstract_text: None,
        };
        reg.record_extraction(&job.id, Path::new("/data/text/x.txt"), paper.clone())
            .unwrap();
        let failed = reg
            .mark_failed(&job.id, Stage::Analysis, "malformed output")
            .unwrap();

        assert_eq!(
            failed.extracted_text_path.as_deref(),
            Some(Path::new("/data/text/x.txt"))
        );
        assert_eq!(failed.paper, paper);
        assert!(failed.result_id.is_none());
        assert!(matches!(
            reg.get_result(&job.id, "alice"),
            Err(ReadError::NotReady {
                status: JobStatus::Failed
            })
        ));
    }

    #[test]
    fn test_other_owner_sees_not_found() {
        let reg = registry();
        let job = processing(&reg, "alice");

        assert!(matches!(reg.get_status(&job.id, "bob"), Err(ReadError::NotFound)));
        assert!(matches!(reg.get_result(&job.id, "bob"), Err(ReadError::NotFound)));
        assert!(matches!(reg.get_status("no-such-job", "bob"), Err(ReadError::NotFound)));
        assert!(matches!(reg.remove(&job.id, "bob"), Err(ReadError::NotFound)));
    }

    #[test]
    fn test_reads_fall_back_to_database() {
        let db = Database::open_in_memory().unwrap();
        let writer = JobRegistry::new(db.clone());
        let job = processing(&writer, "alice");
        writer
            .record_extraction(&job.id, Path::new("/t.txt"), PaperMetadata::default())
            .unwrap();
        let result = result_for(&job.id);
        writer.complete(&job.id, &result).unwrap();

        // A fresh registry over the same database has an empty cache.
        let reader = JobRegistry::new(db);
        assert_eq!(reader.get_status(&job.id, "alice").unwrap(), JobStatus::Analyzed);
        assert_eq!(reader.get_result(&job.id, "alice").unwrap(), result);
        assert_eq!(reader.get_result(&job.id, "alice").unwrap(), result);
    }

    #[test]
    fn test_stale_cache_write_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let a = JobRegistry::new(db.clone());
        let b = JobRegistry::new(db);
        let job = processing(&a, "alice");

        // b caches the job as processing, then a moves it on.
        b.get_job(&job.id, "alice").unwrap();
        a.mark_failed(&job.id, Stage::Extraction, "boom").unwrap();

        let err = b.mark_failed(&job.id, Stage::Analysis, "late").unwrap_err();
        assert!(matches!(err, RegistryError::Conflict(_)));
        // The conflicting entry was evicted; b now sees the committed state.
        assert_eq!(b.get_status(&job.id, "alice").unwrap(), JobStatus::Failed);
    }

    #[test]
    fn test_list_jobs_scoped_to_owner() {
        let reg = registry();
        processing(&reg, "alice");
        let failed = processing(&reg, "alice");
        reg.mark_failed(&failed.id, Stage::Extraction, "x").unwrap();
        processing(&reg, "bob");

        let all = reg.list_jobs("alice", &JobQuery::default()).unwrap();
        assert_eq!(all.total, 2);

        let only_failed = reg
            .list_jobs(
                "alice",
                &JobQuery {
                    status: Some(JobStatus::Failed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(only_failed.total, 1);
        assert_eq!(only_failed.jobs[0].id, failed.id);
    }

    #[test]
    fn test_remove_deletes_job_and_result() {
        let reg = registry();
        let job = processing(&reg, "alice");
        reg.record_extraction(&job.id, Path::new("/t.txt"), PaperMetadata::default())
            .unwrap();
        reg.complete(&job.id, &result_for(&job.id)).unwrap();

        reg.remove(&job.id, "alice").unwrap();

        assert!(matches!(reg.get_status(&job.id, "alice"), Err(ReadError::NotFound)));
        assert_eq!(result_repo::count(reg.database()).unwrap(), 0);
    }

    #[test]
    fn test_unfinished_and_counts() {
        let reg = registry();
        let waiting = uploaded("alice");
        reg.create(&waiting).unwrap();
        let running = processing(&reg, "alice");
        let done = processing(&reg, "alice");
        reg.mark_failed(&done.id, Stage::Analysis, "x").unwrap();

        let ids: Vec<_> = reg.unfinished().unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&waiting.id));
        assert!(ids.contains(&running.id));

        assert_eq!(
            reg.status_counts().unwrap(),
            StatusCounts {
                uploaded: 1,
                processing: 1,
                analyzed: 0,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_record_stats_for_terminal_jobs() {
        let reg = registry();
        let job = processing(&reg, "alice");
        reg.record_stats(&job);
        let failed = reg.mark_failed(&job.id, Stage::Extraction, "x").unwrap();
        reg.record_stats(&failed);

        let rows = reg.stats(None, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].outcome, "failed_extraction");
        assert_eq!(rows[0].format, "text");
    }
}
