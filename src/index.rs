//! Read-only client for the remote vector index.
//!
//! The index stores knowledge documents as vectors with JSON metadata. This
//! crate only queries it; ingestion happens elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GovernorConfig, IndexConfig};
use crate::error::{RagError, Result};
use crate::http::{self, Auth, RetryPolicy};
use crate::rag::types::DocumentMetadata;

/// Metadata predicates applied by the index before scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub min_confidence: Option<f64>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.tags.is_empty() && self.min_confidence.is_none()
    }

    /// Render in the index's filter grammar. `None` when there is nothing to filter.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        if self.is_empty() {
            return None;
        }
        let mut filter = serde_json::Map::new();
        if !self.categories.is_empty() {
            filter.insert("category".into(), serde_json::json!({ "$in": self.categories }));
        }
        if !self.tags.is_empty() {
            filter.insert("tags".into(), serde_json::json!({ "$in": self.tags }));
        }
        if let Some(min) = self.min_confidence {
            filter.insert("confidenceScore".into(), serde_json::json!({ "$gte": min }));
        }
        Some(serde_json::Value::Object(filter))
    }
}

#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: MetadataFilter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<serde_json::Value>,
}

/// Decode each match on its own. A record that cannot be read is skipped
/// without failing the rest of the batch.
fn decode_matches(raw: Vec<serde_json::Value>) -> Vec<IndexMatch> {
    raw.into_iter()
        .filter_map(|value| {
            let id = value.get("id").cloned();
            match serde_json::from_value::<IndexMatch>(value) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::warn!(id = ?id, error = %e, "skipping unreadable index match");
                    None
                }
            }
        })
        .collect()
}

pub struct HttpVectorIndex {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    namespace: String,
}

impl HttpVectorIndex {
    pub fn new(config: &IndexConfig, governor: &GovernorConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(RagError::Config("index.base_url is not set".into()));
        }
        if config.api_key.trim().is_empty() {
            return Err(RagError::Config("index.api_key is not set".into()));
        }
        Ok(Self {
            client: http::build_client(governor.request_timeout_seconds)?,
            url: format!("{}/query", config.base_url.trim_end_matches('/')),
            auth: Auth::Header("Api-Key", config.api_key.clone()),
            namespace: config.namespace.clone(),
        })
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexMatch>> {
        let body = QueryBody {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: true,
            namespace: &self.namespace,
            filter: query.filter.to_json(),
        };
        let resp: QueryResponse =
            http::post_json(&self.client, &self.url, &self.auth, &body, RetryPolicy::NoRetry)
                .await?;
        let returned = resp.matches.len();
        let matches = decode_matches(resp.matches);
        tracing::debug!(
            namespace = %self.namespace,
            top_k = query.top_k,
            returned,
            matches = matches.len(),
            "vector index queried"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_is_omitted() {
        assert_eq!(MetadataFilter::default().to_json(), None);
    }

    #[test]
    fn filter_uses_in_and_gte() {
        let filter = MetadataFilter {
            categories: vec!["fasting".into()],
            tags: vec!["electrolytes".into(), "sodium".into()],
            min_confidence: Some(0.8),
        };
        assert_eq!(
            filter.to_json().unwrap(),
            serde_json::json!({
                "category": { "$in": ["fasting"] },
                "tags": { "$in": ["electrolytes", "sodium"] },
                "confidenceScore": { "$gte": 0.8 }
            })
        );
    }

    #[test]
    fn match_without_metadata_gets_defaults() {
        let m: IndexMatch = serde_json::from_value(serde_json::json!({ "id": "a", "score": 0.91 })).unwrap();
        assert_eq!(m.metadata.title, "Untitled");
        assert_eq!(m.score, 0.91);
    }

    #[test]
    fn unreadable_match_is_skipped() {
        let raw = vec![
            serde_json::json!({ "id": "good", "score": 0.9, "metadata": { "title": "Ok" } }),
            serde_json::json!({ "score": 0.8 }),
            serde_json::json!({ "id": "bad", "score": "high" }),
        ];
        let matches = decode_matches(raw);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "good");
    }
}
