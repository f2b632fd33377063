//! Analysis result model and the analyzer output format.
//!
//! Analyzers write a JSON document:
//!
//! ```json
//! {
//!   "summary": "...",
//!   "extractedTopics": [{"topic": "ML", "relevanceScore": 0.8, "keywords": ["model"]}],
//!   "suggestedTopics": [{"topicId": "t1", "topicName": "Machine Learning", "suggestionScore": 0.7}],
//!   "suggestedAreas": [{"area": "Optimization", "reasoning": "..."}],
//!   "analyzedWith": "OpenAI",
//!   "analysisDate": "..."
//! }
//! ```
//!
//! `summary` and `extractedTopics` are required. Everything else is optional,
//! and `analysisDate` is ignored in favour of the time the result is stored.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::taxonomy::TopicSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTopic {
    #[serde(rename = "topic")]
    pub label: String,
    pub relevance_score: f64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedTopic {
    pub topic_id: String,
    #[serde(rename = "topicName")]
    pub topic_label: String,
    pub suggestion_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedArea {
    pub area: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Outcome of a successful analysis. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub job_id: String,
    pub summary: String,
    pub extracted_topics: Vec<ExtractedTopic>,
    pub suggested_topics: Vec<SuggestedTopic>,
    pub suggested_areas: Vec<SuggestedArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_with: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum OutputFormatError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field} is not a finite number")]
    NonFiniteScore { field: &'static str },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    summary: String,
    extracted_topics: Vec<RawExtractedTopic>,
    #[serde(default)]
    suggested_topics: Vec<RawSuggestedTopic>,
    #[serde(default)]
    suggested_areas: Vec<SuggestedArea>,
    #[serde(default)]
    analyzed_with: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtractedTopic {
    #[serde(alias = "topicLabel")]
    topic: String,
    relevance_score: f64,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestedTopic {
    #[serde(default)]
    topic_id: Option<String>,
    #[serde(default, alias = "topicLabel")]
    topic_name: Option<String>,
    suggestion_score: f64,
}

/// Parses analyzer output into a result for `job_id`.
///
/// Scores outside `[0, 1]` are clamped and keywords de-duplicated in order.
/// Suggestions that do not resolve against `snapshot` are dropped; each
/// surviving suggestion carries the snapshot's id and name.
pub fn parse_analysis_output(
    bytes: &[u8],
    job_id: &str,
    snapshot: &TopicSnapshot,
) -> Result<AnalysisResult, OutputFormatError> {
    let raw: RawAnalysis = serde_json::from_slice(bytes)?;

    let extracted_topics = raw
        .extracted_topics
        .into_iter()
        .map(|t| {
            Ok(ExtractedTopic {
                label: t.topic.trim().to_string(),
                relevance_score: normalize_score(t.relevance_score, "relevanceScore")?,
                keywords: dedup_keywords(t.keywords),
            })
        })
        .collect::<Result<Vec<_>, OutputFormatError>>()?;

    let mut suggested_topics = Vec::with_capacity(raw.suggested_topics.len());
    let mut seen = HashSet::new();
    for suggestion in raw.suggested_topics {
        let score = normalize_score(suggestion.suggestion_score, "suggestionScore")?;
        let Some(topic) = snapshot.resolve(
            suggestion.topic_id.as_deref(),
            suggestion.topic_name.as_deref(),
        ) else {
            log::warn!(
                "Job {}: dropping suggestion {:?} ({:?}), not in topic snapshot",
                job_id,
                suggestion.topic_name,
                suggestion.topic_id
            );
            continue;
        };
        if !seen.insert(topic.id.clone()) {
            continue;
        }
        suggested_topics.push(SuggestedTopic {
            topic_id: topic.id.clone(),
            topic_label: topic.name.clone(),
            suggestion_score: score,
        });
    }

    let suggested_areas = raw
        .suggested_areas
        .into_iter()
        .filter(|a| !a.area.trim().is_empty())
        .collect();

    Ok(AnalysisResult {
        id: uuid::Uuid::new_v4().to_string(),
        job_id: job_id.to_string(),
        summary: raw.summary,
        extracted_topics,
        suggested_topics,
        suggested_areas,
        analyzed_with: raw.analyzed_with.filter(|s| !s.trim().is_empty()),
        created_at: Utc::now(),
    })
}

fn normalize_score(value: f64, field: &'static str) -> Result<f64, OutputFormatError> {
    if !value.is_finite() {
        return Err(OutputFormatError::NonFiniteScore { field });
    }
    Ok(value.clamp(0.0, 1.0))
}

fn dedup_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}
