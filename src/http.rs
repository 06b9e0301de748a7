//! JSON-over-HTTP plumbing shared by the provider clients and the vector index.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::error::{RagError, Result};

/// How a request authenticates.
#[derive(Debug, Clone)]
pub enum Auth {
    Bearer(String),
    /// Header name and value, e.g. `Api-Key`.
    Header(&'static str, String),
}

impl Auth {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Bearer(key) => req.bearer_auth(key),
            Auth::Header(name, value) => req.header(*name, value),
        }
    }
}

/// Build a client whose every request times out after `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))
}

/// What to do when the server answers 429.
#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    /// Sleep the given delay, then try exactly once more.
    RetryOnceAfter(Duration),
    NoRetry,
}

/// POST `body` as JSON and decode a JSON response.
///
/// 429 is retried at most once according to `retry`. Any other non-success
/// status fails with [`RagError::Upstream`] carrying the status and body.
pub async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    auth: &Auth,
    body: &B,
    retry: RetryPolicy,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut retry = retry;
    loop {
        let resp = auth.apply(client.post(url).json(body)).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = resp.text().await.unwrap_or_default();
            match retry {
                RetryPolicy::RetryOnceAfter(delay) => {
                    tracing::warn!(
                        url,
                        delay_ms = delay.as_millis() as u64,
                        "provider rate limited request, retrying once"
                    );
                    tokio::time::sleep(delay).await;
                    retry = RetryPolicy::NoRetry;
                    continue;
                }
                RetryPolicy::NoRetry => return Err(RagError::RateLimited { body: text }),
            }
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RagError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = resp.bytes().await?;
        return serde_json::from_slice(&bytes)
            .map_err(|e| RagError::Parse(format!("{url}: {e}")));
    }
}
