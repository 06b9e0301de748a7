//! Core RAG type definitions.
//!
//! Defines [`QueryType`] (the health topics a query can be scoped to),
//! [`HealthQueryContext`], [`KnowledgeDocument`] with its typed
//! [`DocumentMetadata`], per-query [`SearchResult`]s, and the
//! [`Outcome`]/[`Degradation`] pair used by the best-effort stages.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::RetrievalConfig;
use crate::error::RagError;

/// Health topic a query is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Fasting,
    Nutrition,
    Exercise,
    Sleep,
    Weight,
    Hydration,
    MentalHealth,
    #[default]
    General,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fasting => "fasting",
            Self::Nutrition => "nutrition",
            Self::Exercise => "exercise",
            Self::Sleep => "sleep",
            Self::Weight => "weight",
            Self::Hydration => "hydration",
            Self::MentalHealth => "mental_health",
            Self::General => "general",
        }
    }

    /// Whether `text` mentions this topic, either as `mental_health` or
    /// `mental health`. Case-insensitive.
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        let name = self.as_str();
        text.contains(name) || (name.contains('_') && text.contains(&name.replace('_', " ")))
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "fasting" => Ok(Self::Fasting),
            "nutrition" => Ok(Self::Nutrition),
            "exercise" => Ok(Self::Exercise),
            "sleep" => Ok(Self::Sleep),
            "weight" => Ok(Self::Weight),
            "hydration" => Ok(Self::Hydration),
            "mental_health" => Ok(Self::MentalHealth),
            "general" => Ok(Self::General),
            _ => Err(format!("unknown query type: {s}")),
        }
    }
}

/// Who is asking and what they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthQueryContext {
    pub user_id: String,
    pub query_type: QueryType,
    #[serde(default)]
    pub user_profile: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub current_goals: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub recent_activity: BTreeMap<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl HealthQueryContext {
    pub fn new(user_id: impl Into<String>, query_type: QueryType) -> Self {
        Self {
            user_id: user_id.into(),
            query_type,
            user_profile: BTreeMap::new(),
            current_goals: Vec::new(),
            dietary_restrictions: Vec::new(),
            recent_activity: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_goals(mut self, goals: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.current_goals = goals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_restrictions(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dietary_restrictions = items.into_iter().map(Into::into).collect();
        self
    }
}

fn default_title() -> String {
    "Untitled".into()
}

fn default_category() -> String {
    "general".into()
}

fn default_source() -> String {
    "unknown".into()
}

fn default_confidence() -> f64 {
    0.5
}

/// Interpret a timestamp written by any of the common index clients: RFC 3339,
/// a bare `YYYY-MM-DDTHH:MM:SS`, a date, or epoch seconds/milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            // Anything past year 5138 in seconds is really milliseconds
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                        .ok()
                        .map(|dt| dt.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
        }
        _ => None,
    }
}

fn lenient_created_at<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = parse_timestamp(&value);
    if parsed.is_none() && !value.is_null() {
        tracing::warn!(value = %value, "ignoring unreadable createdAt");
    }
    Ok(parsed)
}

fn lenient_confidence<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite());
    match parsed {
        Some(c) => Ok(c.clamp(0.0, 1.0)),
        None => {
            if !value.is_null() {
                tracing::warn!(value = %value, "ignoring unreadable confidenceScore");
            }
            Ok(default_confidence())
        }
    }
}

/// Tags as a list, or as one comma-separated string.
fn lenient_tags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}

/// Document metadata as stored in the vector index.
///
/// Known fields are typed; anything else the provider attaches lands in
/// `extra` and is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_confidence", deserialize_with = "lenient_confidence")]
    pub confidence_score: f64,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            content: String::new(),
            title: default_title(),
            category: default_category(),
            source: default_source(),
            confidence_score: default_confidence(),
            tags: Vec::new(),
            created_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A knowledge base entry. Read-only from this crate's point of view.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KnowledgeDocument {
    pub id: String,
    pub content: String,
    pub title: String,
    pub category: String,
    pub source: String,
    /// Editorial confidence in `[0.0, 1.0]`.
    pub confidence_score: f64,
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl KnowledgeDocument {
    pub fn from_metadata(id: impl Into<String>, meta: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            content: meta.content,
            title: meta.title,
            category: meta.category,
            source: meta.source,
            confidence_score: meta.confidence_score.clamp(0.0, 1.0),
            tags: meta.tags.into_iter().collect(),
            created_at: meta.created_at,
            metadata: meta.extra,
        }
    }
}

/// Why a result was returned, in descending priority.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MatchReason {
    KeyTerm(String),
    Category(String),
    RelatedConcept(String),
    SemanticSimilarity,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyTerm(t) => write!(f, "Contains key term '{t}'"),
            Self::Category(c) => write!(f, "Category match: {c}"),
            Self::RelatedConcept(c) => write!(f, "Related concept: {c}"),
            Self::SemanticSimilarity => f.write_str("Semantic similarity"),
        }
    }
}

/// A ranked document for one query. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: KnowledgeDocument,
    /// Raw vector similarity in `[0.0, 1.0]`.
    pub similarity_score: f64,
    pub relevance_score: f64,
    pub match_reason: MatchReason,
    pub matched_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextualizedQuery {
    pub original_query: String,
    pub expanded_query: String,
    pub key_terms: Vec<String>,
    pub related_concepts: Vec<String>,
    pub term_weights: BTreeMap<String, f64>,
    pub context: Option<HealthQueryContext>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub max_results: usize,
    pub min_similarity: f64,
    pub category_filter: Vec<String>,
    pub tag_filter: Vec<String>,
}

impl SearchOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_results: config.default_max_results,
            min_similarity: config.min_similarity,
            ..Self::default()
        }
    }
}

/// Reason a best-effort stage fell back to its documented default value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum Degradation {
    BudgetExceeded(String),
    RateLimitExceeded(String),
    ProviderError(String),
    IndexError(String),
    EmptyRetrieval,
}

impl Degradation {
    /// Classify a provider-side error. Exhaustion is logged at `error`, any
    /// other failure at `warn`.
    pub fn from_error(stage: &str, err: &RagError) -> Self {
        match err {
            RagError::BudgetExceeded { .. } => {
                tracing::error!(stage, error = %err, "budget exhausted, degrading");
                Self::BudgetExceeded(err.to_string())
            }
            RagError::RateLimitExceeded { .. } => {
                tracing::error!(stage, error = %err, "request window exhausted, degrading");
                Self::RateLimitExceeded(err.to_string())
            }
            _ => {
                tracing::warn!(stage, error = %err, "provider call failed, degrading");
                Self::ProviderError(err.to_string())
            }
        }
    }

    pub fn index(err: &RagError) -> Self {
        tracing::warn!(error = %err, "vector index query failed, degrading");
        Self::IndexError(err.to_string())
    }

    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::BudgetExceeded(_) | Self::RateLimitExceeded(_))
    }
}

/// A value that may be a documented fallback rather than the real thing.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub degraded: Option<Degradation>,
}

impl<T> Outcome<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            degraded: None,
        }
    }

    pub fn degraded(value: T, reason: Degradation) -> Self {
        Self {
            value,
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn into_parts(self) -> (T, Option<Degradation>) {
        (self.value, self.degraded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePath {
    /// Answer built from retrieved documents.
    Grounded,
    /// No usable documents, or the completion failed.
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedResponse {
    /// UUID v7, for correlating logs.
    pub request_id: String,
    pub text: String,
    pub path: ResponsePath,
    pub sources: Vec<SourceRef>,
    /// Model that produced `text`; `None` for the static fallback.
    pub model: Option<String>,
    pub degraded: Option<Degradation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_type_round_trips() {
        for qt in [
            QueryType::Fasting,
            QueryType::Nutrition,
            QueryType::Exercise,
            QueryType::Sleep,
            QueryType::Weight,
            QueryType::Hydration,
            QueryType::MentalHealth,
            QueryType::General,
        ] {
            assert_eq!(qt.as_str().parse::<QueryType>().unwrap(), qt);
        }
        assert_eq!("Mental Health".parse::<QueryType>().unwrap(), QueryType::MentalHealth);
        assert!("astrology".parse::<QueryType>().is_err());
    }

    #[test]
    fn mention_accepts_both_spellings() {
        assert!(QueryType::MentalHealth.is_mentioned_in("Mental Health & Stress"));
        assert!(QueryType::MentalHealth.is_mentioned_in("mental_health"));
        assert!(QueryType::Fasting.is_mentioned_in("Intermittent Fasting"));
        assert!(!QueryType::Sleep.is_mentioned_in("nutrition"));
    }

    #[test]
    fn metadata_keeps_unknown_fields() {
        let json = serde_json::json!({
            "content": "Break a fast with protein.",
            "title": "Refeeding",
            "category": "fasting",
            "confidenceScore": 0.9,
            "tags": ["refeeding", "protein"],
            "createdAt": "2026-01-05T00:00:00Z",
            "reviewer": "dietitian"
        });
        let meta: DocumentMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(meta.confidence_score, 0.9);
        assert_eq!(meta.source, "unknown");
        assert_eq!(meta.extra.get("reviewer").unwrap(), "dietitian");

        let doc = KnowledgeDocument::from_metadata("doc-1", meta);
        assert!(doc.tags.contains("protein"));
        assert!(doc.created_at.is_some());
    }

    #[test]
    fn sparse_metadata_gets_defaults() {
        let meta: DocumentMetadata = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(meta, DocumentMetadata::default());
    }

    #[test]
    fn provider_specific_field_encodings_are_accepted() {
        let meta: DocumentMetadata = serde_json::from_value(serde_json::json!({
            "confidenceScore": "0.85",
            "tags": "sleep, magnesium",
            "createdAt": 1767225600000i64
        }))
        .unwrap();
        assert_eq!(meta.confidence_score, 0.85);
        assert_eq!(meta.tags, vec!["sleep", "magnesium"]);
        assert_eq!(meta.created_at, DateTime::from_timestamp(1_767_225_600, 0));

        let meta: DocumentMetadata = serde_json::from_value(serde_json::json!({
            "confidenceScore": "high",
            "createdAt": "last tuesday"
        }))
        .unwrap();
        assert_eq!(meta.confidence_score, 0.5);
        assert_eq!(meta.created_at, None);
    }

    #[test]
    fn timestamps_in_common_shapes() {
        let expected = DateTime::from_timestamp(1_767_225_600, 0);
        for value in [
            serde_json::json!("2026-01-01T00:00:00Z"),
            serde_json::json!("2026-01-01T00:00:00"),
            serde_json::json!("2026-01-01"),
            serde_json::json!(1_767_225_600),
            serde_json::json!(1_767_225_600_000i64),
        ] {
            assert_eq!(parse_timestamp(&value), expected, "{value}");
        }
        assert_eq!(parse_timestamp(&serde_json::json!(true)), None);
    }

    #[test]
    fn degradation_classifies_exhaustion() {
        let d = Degradation::from_error("embed", &RagError::BudgetExceeded { spent: 5.0, limit: 5.0 });
        assert!(d.is_exhaustion());
        let d = Degradation::from_error("embed", &RagError::Parse("bad".into()));
        assert!(matches!(d, Degradation::ProviderError(_)));
        assert!(!d.is_exhaustion());
    }
}
