//! OpenAI-compatible embedding endpoint client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{Embedding, EmbeddingProvider};
use crate::config::{EmbeddingConfig, GovernorConfig};
use crate::error::{RagError, Result};
use crate::http::{self, Auth, RetryPolicy};

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    model: String,
    backoff: Duration,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, governor: &GovernorConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RagError::Config("embedding.api_key is not set".into()));
        }
        Ok(Self {
            client: http::build_client(governor.request_timeout_seconds)?,
            url: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            auth: Auth::Bearer(config.api_key.clone()),
            model: config.model.clone(),
            backoff: Duration::from_secs(governor.rate_limit_backoff_seconds),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let started = Instant::now();
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let resp: EmbeddingResponse = http::post_json(
            &self.client,
            &self.url,
            &self.auth,
            &body,
            RetryPolicy::RetryOnceAfter(self.backoff),
        )
        .await?;

        let vector = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RagError::Parse("embedding response had no vector".into()))?;

        // Some gateways only report total_tokens
        let prompt_tokens = resp
            .usage
            .map(|u| u.prompt_tokens.max(u.total_tokens))
            .unwrap_or(0);

        Ok(Embedding {
            vector,
            prompt_tokens,
            model: resp.model.unwrap_or_else(|| self.model.clone()),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
