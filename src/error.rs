//! Error taxonomy shared by the provider clients, the governor, and the pipeline.
//!
//! Pre-flight rejections ([`RagError::BudgetExceeded`], [`RagError::RateLimitExceeded`])
//! are kept distinct from upstream failures so callers can tell an operational
//! condition apart from a flaky provider.

use serde::Serialize;
use thiserror::Error;

/// Which class of paid API call a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Chat,
    Embedding,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid configuration. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider answered 429 on the original attempt and on the single retry.
    #[error("provider rate limited the request (HTTP 429) after retry: {body}")]
    RateLimited { body: String },

    /// Any other non-success HTTP status.
    #[error("upstream error: HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Connection failure or timeout.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered 200 with a payload we could not use.
    #[error("malformed provider response: {0}")]
    Parse(String),

    #[error("daily budget exceeded: spent ${spent:.4} of ${limit:.4}")]
    BudgetExceeded { spent: f64, limit: f64 },

    #[error("daily {kind} request limit reached ({limit} per 24h)")]
    RateLimitExceeded { kind: RequestKind, limit: usize },

    /// A spawned provider task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),
}

impl RagError {
    /// `true` for the pre-flight budget/rate signals, which never touch the network.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded { .. } | Self::RateLimitExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
