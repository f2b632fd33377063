//! Topic taxonomy the analysis stage suggests from.
//!
//! Analysis never reads the live taxonomy. The pipeline takes a
//! [`TopicSnapshot`] when a run reaches the analysis stage, hands that to
//! the analyzer, and resolves suggestions against the same snapshot, so
//! topics added or removed mid-run cannot produce dangling references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TopicSeed;
use crate::db::{topic_repo, Database, DatabaseError};

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Failed to read topics: {0}")]
    Database(#[from] DatabaseError),

    #[error("Topic name must not be empty")]
    EmptyName,

    #[error("Topic '{0}' already exists")]
    Duplicate(String),
}

/// One taxonomy entry. Serializes with `_id`, the shape analyzers expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<topic_repo::TopicRow> for Topic {
    fn from(row: topic_repo::TopicRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
        }
    }
}

/// Source of the current taxonomy.
pub trait TopicProvider: Send + Sync {
    fn list_topics(&self) -> Result<Vec<Topic>, TaxonomyError>;
}

/// Point-in-time copy of the taxonomy used for one analysis run.
#[derive(Debug, Clone)]
pub struct TopicSnapshot {
    pub taken_at: DateTime<Utc>,
    pub topics: Vec<Topic>,
}

impl TopicSnapshot {
    pub fn take(provider: &dyn TopicProvider) -> Result<Self, TaxonomyError> {
        Ok(Self {
            taken_at: Utc::now(),
            topics: provider.list_topics()?,
        })
    }

    /// JSON array of `{"_id", "name", "description"}`.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.topics)
    }

    /// Finds the snapshot entry a suggestion refers to: by id first, then by
    /// case-insensitive name.
    pub fn resolve(&self, id: Option<&str>, name: Option<&str>) -> Option<&Topic> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if let Some(topic) = self.topics.iter().find(|t| t.id == id) {
                return Some(topic);
            }
        }
        let name = name?.trim();
        self.topics
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Taxonomy backed by the `topics` table.
#[derive(Clone)]
pub struct TopicCatalog {
    db: Database,
}

impl TopicCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds a topic and returns it with its new id.
    pub fn add(&self, name: &str, description: &str) -> Result<Topic, TaxonomyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaxonomyError::EmptyName);
        }
        if topic_repo::find_by_name(&self.db, name)?.is_some() {
            return Err(TaxonomyError::Duplicate(name.to_string()));
        }

        let row = topic_repo::TopicRow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.trim().to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        topic_repo::insert(&self.db, &row)?;
        log::info!("Added topic '{}' ({})", row.name, row.id);
        Ok(row.into())
    }

    /// Inserts configured topics when the catalog is empty. Returns how many
    /// were added.
    pub fn seed_if_empty(&self, seeds: &[TopicSeed]) -> Result<usize, TaxonomyError> {
        if seeds.is_empty() || topic_repo::count(&self.db)? > 0 {
            return Ok(0);
        }
        for seed in seeds {
            self.add(&seed.name, &seed.description)?;
        }
        log::info!("Seeded topic catalog with {} topics", seeds.len());
        Ok(seeds.len())
    }
}

impl TopicProvider for TopicCatalog {
    fn list_topics(&self) -> Result<Vec<Topic>, TaxonomyError> {
        Ok(topic_repo::list(&self.db)?
            .into_iter()
            .map(Topic::from)
            .collect())
    }
}

/// Fixed taxonomy.
#[derive(Debug, Clone, Default)]
pub struct StaticTopics(pub Vec<Topic>);

impl TopicProvider for StaticTopics {
    fn list_topics(&self) -> Result<Vec<Topic>, TaxonomyError> {
        Ok(self.0.clone())
    }
}
