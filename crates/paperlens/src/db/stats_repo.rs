//! Processing statistics repository: per-day counters by document format
//! and pipeline outcome.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Records one finished pipeline run into the daily statistics.
///
/// `outcome` is `analyzed`, `failed_extraction` or `failed_analysis`.
pub fn record_job_completion(
    db: &Database,
    date: &str,
    format: &str,
    outcome: &str,
    duration_ms: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        // Right-hand column references in DO UPDATE see the old row, so with
        // old count N and old avg A: new_avg = (A * N + value) / (N + 1).
        conn.execute(
            "INSERT INTO processing_stats (date, format, outcome, total, avg_duration_ms)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(date, format, outcome) DO UPDATE SET
               total = total + 1,
               avg_duration_ms = (avg_duration_ms * total + ?4) / (total + 1)",
            params![date, format, outcome, duration_ms],
        )?;
        Ok(())
    })
}

/// A single statistics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatRow {
    pub date: String,
    pub format: String,
    pub outcome: String,
    pub total: i64,
    pub avg_duration_ms: i64,
}

/// Queries statistics rows within an optional inclusive date range, newest first.
pub fn query(
    db: &Database,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<Vec<ProcessingStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT date, format, outcome, total, avg_duration_ms
             FROM processing_stats
             WHERE (?1 IS NULL OR date >= ?1) AND (?2 IS NULL OR date <= ?2)
             ORDER BY date DESC, format, outcome",
        )?;
        let rows = stmt
            .query_map(params![from_date, to_date], |row| {
                Ok(ProcessingStatRow {
                    date: row.get(0)?,
                    format: row.get(1)?,
                    outcome: row.get(2)?,
                    total: row.get(3)?,
                    avg_duration_ms: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
