//! Chat completion pipeline.
//!
//! [`CompletionProvider`] is the raw provider seam; [`Completer`] puts it
//! behind the [`Governor`] so every call is checked pre-flight and accounted
//! for afterwards.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use client::OpenAiCompletionClient;

use crate::config::CompletionConfig;
use crate::error::{RagError, RequestKind, Result};
use crate::governor::Governor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Model that actually served the request.
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Budget-gated completion front end.
pub struct Completer {
    provider: Arc<dyn CompletionProvider>,
    governor: Arc<Governor>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl Completer {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        governor: Arc<Governor>,
        config: &CompletionConfig,
    ) -> Self {
        Self {
            provider,
            governor,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// A request for `messages` with the configured model and limits.
    pub fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    pub async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.governor.preflight(RequestKind::Chat)?;

        let provider = Arc::clone(&self.provider);
        let governor = Arc::clone(&self.governor);
        // Detached so the spend is recorded even if the caller gives up
        let handle = tokio::spawn(async move {
            let completion = provider.complete(&request).await?;
            governor.record_chat(
                &completion.model,
                completion.prompt_tokens,
                completion.completion_tokens,
                completion.latency_ms,
            );
            Ok::<_, RagError>(completion)
        });

        let completion = handle
            .await
            .map_err(|e| RagError::Task(format!("completion task failed: {e}")))??;
        tracing::debug!(
            model = %completion.model,
            prompt_tokens = completion.prompt_tokens,
            completion_tokens = completion.completion_tokens,
            latency_ms = completion.latency_ms,
            "completion generated"
        );
        Ok(completion)
    }
}
