//! Analysis result repository: the `analysis_results` table.
//!
//! Topic lists are stored as JSON text; decoding them is the registry's job.

use rusqlite::{params, Connection, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub id: String,
    pub job_id: String,
    pub summary: String,
    pub extracted_topics: String,
    pub suggested_topics: String,
    pub suggested_areas: String,
    pub analyzed_with: Option<String>,
    pub created_at: String,
}

impl ResultRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            summary: row.get("summary")?,
            extracted_topics: row.get("extracted_topics")?,
            suggested_topics: row.get("suggested_topics")?,
            suggested_areas: row.get("suggested_areas")?,
            analyzed_with: row.get("analyzed_with")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a result on the given connection. Used inside the transaction
/// that also flips the owning job to `analyzed`.
pub fn insert(conn: &Connection, result: &ResultRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO analysis_results (id, job_id, summary, extracted_topics, suggested_topics,
         suggested_areas, analyzed_with, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.id,
            result.job_id,
            result.summary,
            result.extracted_topics,
            result.suggested_topics,
            result.suggested_areas,
            result.analyzed_with,
            result.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ResultRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM analysis_results WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ResultRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |r| r.get(0))?;
        Ok(count)
    })
}
