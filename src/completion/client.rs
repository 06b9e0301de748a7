//! OpenAI-compatible chat completion client.
//!
//! Model selection is optimized before the first attempt (see
//! [`optimize_request`]). When the provider answers 429 the client sleeps for
//! the configured backoff and retries exactly once with the request as the
//! caller built it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{ChatMessage, Completion, CompletionProvider, CompletionRequest};
use crate::config::{CompletionConfig, GovernorConfig};
use crate::error::{RagError, Result};
use crate::http::{self, Auth, RetryPolicy};

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Thresholds for pre-flight model optimization.
#[derive(Debug, Clone)]
pub struct OptimizationRules {
    pub cheap_model: String,
    pub small_request_chars: usize,
    pub large_context_chars: usize,
    pub large_context_max_tokens: u32,
}

impl From<&CompletionConfig> for OptimizationRules {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            cheap_model: config.cheap_model.clone(),
            small_request_chars: config.small_request_chars,
            large_context_chars: config.large_context_chars,
            large_context_max_tokens: config.large_context_max_tokens,
        }
    }
}

/// `true` for the gpt-4 family, excluding the `-mini` variants.
pub fn is_expensive_model(model: &str) -> bool {
    model.starts_with("gpt-4") && !model.contains("mini")
}

/// Downgrade expensive models on small requests and cap `max_tokens` on large
/// ones. Length is the combined character count of all messages.
pub fn optimize_request(request: &CompletionRequest, rules: &OptimizationRules) -> CompletionRequest {
    let total_chars: usize = request
        .messages
        .iter()
        .map(|m| m.content.chars().count())
        .sum();
    let mut optimized = request.clone();

    if total_chars < rules.small_request_chars && is_expensive_model(&request.model) {
        tracing::debug!(
            from = %request.model,
            to = %rules.cheap_model,
            total_chars,
            "small request, downgrading model"
        );
        optimized.model = rules.cheap_model.clone();
    }

    if total_chars > rules.large_context_chars {
        optimized.max_tokens = optimized.max_tokens.min(rules.large_context_max_tokens);
    }

    optimized
}

pub struct OpenAiCompletionClient {
    client: reqwest::Client,
    url: String,
    auth: Auth,
    rules: OptimizationRules,
    backoff: Duration,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig, governor: &GovernorConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RagError::Config("completion.api_key is not set".into()));
        }
        Ok(Self {
            client: http::build_client(governor.request_timeout_seconds)?,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            auth: Auth::Bearer(config.api_key.clone()),
            rules: OptimizationRules::from(config),
            backoff: Duration::from_secs(governor.rate_limit_backoff_seconds),
        })
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Completion> {
        let started = Instant::now();
        let body = ChatRequestBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };
        let resp: ChatResponse =
            http::post_json(&self.client, &self.url, &self.auth, &body, RetryPolicy::NoRetry)
                .await?;

        let text = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::Parse("completion response had no content".into()))?;
        let usage = resp.usage.unwrap_or_default();

        Ok(Completion {
            text: text.trim().to_string(),
            model: resp.model.unwrap_or_else(|| request.model.clone()),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let optimized = optimize_request(request, &self.rules);
        match self.attempt(&optimized).await {
            Err(RagError::RateLimited { .. }) => {
                tracing::warn!(
                    delay_ms = self.backoff.as_millis() as u64,
                    model = %request.model,
                    "completion rate limited, retrying once without optimization"
                );
                tokio::time::sleep(self.backoff).await;
                self.attempt(request).await
            }
            other => other,
        }
    }
}
