//! Topic repository: the taxonomy the analysis stage suggests from.
//!
//! The pipeline only reads topics. `insert` exists for the administration
//! side (CLI `topics add`, config seeding) and tests.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct TopicRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

impl TopicRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a topic. Names are unique case-insensitively.
pub fn insert(db: &Database, topic: &TopicRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO topics (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![topic.id, topic.name, topic.description, topic.created_at],
        )?;
        Ok(())
    })
}

/// All topics, in creation order.
pub fn list(db: &Database) -> Result<Vec<TopicRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM topics ORDER BY created_at, name")?;
        let rows = stmt
            .query_map([], TopicRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn find_by_name(db: &Database, name: &str) -> Result<Option<TopicRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM topics WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], TopicRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM topics", [], |r| r.get(0))?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: &str, name: &str, created_at: &str) -> TopicRow {
        TopicRow {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("About {}", name),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_insert_and_list_in_creation_order() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &topic("t2", "Databases", "2026-01-02T00:00:00Z")).unwrap();
        insert(&db, &topic("t1", "Machine Learning", "2026-01-01T00:00:00Z")).unwrap();

        let names: Vec<_> = list(&db).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Machine Learning", "Databases"]);
        assert_eq!(count(&db).unwrap(), 2);
    }

    #[test]
    fn test_names_unique_ignoring_case() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &topic("t1", "Robotics", "2026-01-01T00:00:00Z")).unwrap();
        assert!(insert(&db, &topic("t2", "robotics", "2026-01-01T00:00:00Z")).is_err());
    }

    #[test]
    fn test_find_by_name_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &topic("t1", "Robotics", "2026-01-01T00:00:00Z")).unwrap();

        let found = find_by_name(&db, "ROBOTICS").unwrap().unwrap();
        assert_eq!(found.id, "t1");
        assert!(find_by_name(&db, "Biology").unwrap().is_none());
    }
}
