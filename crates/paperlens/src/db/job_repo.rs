//! Job repository: CRUD operations for the `jobs` table.
//!
//! Functions taking `&Connection` run on whatever connection or transaction
//! the caller holds; the `&Database` wrappers lock the shared handle.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub format: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub source_path: String,
    pub extracted_text_path: Option<String>,
    pub status: String,
    pub current_stage: String,
    pub result_id: Option<String>,
    pub failed_stage: Option<String>,
    pub error: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            filename: row.get("filename")?,
            format: row.get("format")?,
            mime_type: row.get("mime_type")?,
            size_bytes: row.get("size_bytes")?,
            source_path: row.get("source_path")?,
            extracted_text_path: row.get("extracted_text_path")?,
            status: row.get("status")?,
            current_stage: row.get("current_stage")?,
            result_id: row.get("result_id")?,
            failed_stage: row.get("failed_stage")?,
            error: row.get("error")?,
            title: row.get("title")?,
            abstract_text: row.get("abstract")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, owner_id, filename, format, mime_type, size_bytes, source_path,
             extracted_text_path, status, current_stage, result_id, failed_stage, error, title,
             abstract, created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                job.id,
                job.owner_id,
                job.filename,
                job.format,
                job.mime_type,
                job.size_bytes,
                job.source_path,
                job.extracted_text_path,
                job.status,
                job.current_stage,
                job.result_id,
                job.failed_stage,
                job.error,
                job.title,
                job.abstract_text,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites the mutable fields of a job, but only while its stored status
/// still equals `expected_status`. Fails with `StaleWrite` when the job is
/// gone or another writer moved it first.
///
/// Identity fields (`owner_id`, `filename`, `format`, `source_path`,
/// `created_at`) are never rewritten.
pub fn update_if_status(
    conn: &Connection,
    job: &JobRow,
    expected_status: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET extracted_text_path=?2, status=?3, current_stage=?4, result_id=?5,
         failed_stage=?6, error=?7, title=?8, abstract=?9, updated_at=?10, completed_at=?11
         WHERE id=?1 AND status=?12",
        params![
            job.id,
            job.extracted_text_path,
            job.status,
            job.current_stage,
            job.result_id,
            job.failed_stage,
            job.error,
            job.title,
            job.abstract_text,
            job.updated_at,
            job.completed_at,
            expected_status,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::StaleWrite {
            table: "jobs",
            id: job.id.clone(),
        });
    }
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Deletes a job row. Its analysis result goes with it (`ON DELETE CASCADE`).
/// Returns `true` if a row was removed.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Queries jobs with filters, newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push(format!("owner_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(owner_id.clone()));
        }
        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC, id LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Jobs a previous process left before a terminal state, oldest first.
pub fn find_unfinished(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE status IN ('uploaded', 'processing') ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
