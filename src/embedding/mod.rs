//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, a remote implementation for
//! OpenAI-compatible endpoints, and [`Embedder`], which puts the provider behind
//! the [`EmbeddingCache`] and the [`Governor`].
//!
//! Concurrent requests for the same uncached text are single-flighted: one
//! caller (the leader) makes the provider call while the others wait on a
//! per-key lock, then read the leader's result from the cache. If the leader
//! fails, the next waiter tries on its own. The leader's spawned task writes
//! the cache, so a vector is kept even when the leader is cancelled.

pub mod cache;
pub mod remote;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use cache::{CacheStats, EmbeddingCache};

use crate::error::{RagError, RequestKind, Result};
use crate::governor::Governor;

/// One embedding plus the accounting data the governor needs.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub prompt_tokens: u64,
    /// Model name as reported by the provider.
    pub model: String,
    pub latency_ms: u64,
}

/// Trait for embedding text into vectors.
///
/// Implementations make exactly one logical call per `embed` (plus at most one
/// retry on HTTP 429). Caching and budgeting live in [`Embedder`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Configured model name, used for cache keys.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Cache-checked, budget-gated, single-flight embedding front end.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    governor: Arc<Governor>,
    inflight: GateMap,
}

impl Embedder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        governor: Arc<Governor>,
    ) -> Self {
        Self {
            provider,
            cache,
            governor,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.provider.model().to_string();
        if let Some(vector) = self.cache.get(&model, text) {
            return Ok(vector);
        }

        let key = EmbeddingCache::key(&model, text);
        let flight = self.join(&key);
        let _leader = flight.gate.lock().await;

        // Filled by a concurrent leader while we waited
        if let Some(vector) = self.cache.peek(&model, text) {
            return Ok(vector);
        }

        self.call_provider(model, text).await
    }

    /// Register interest in `key`, sharing the gate of any caller already
    /// working on it. The returned guard unregisters on drop, including when
    /// the caller's future is cancelled.
    fn join(&self, key: &str) -> InflightGuard<'_> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let gate = Arc::clone(inflight.entry(key.to_string()).or_default());
        InflightGuard {
            inflight: &self.inflight,
            key: key.to_string(),
            gate,
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Pre-flight, call, record usage, and cache. The call runs on its own task
    /// so an abandoned caller still gets its spend accounted for and its
    /// vector cached.
    async fn call_provider(&self, model: String, text: &str) -> Result<Vec<f32>> {
        self.governor.preflight(RequestKind::Embedding)?;

        let provider = Arc::clone(&self.provider);
        let governor = Arc::clone(&self.governor);
        let cache = Arc::clone(&self.cache);
        let text = text.to_string();
        let handle = tokio::spawn(async move {
            let embedding = provider.embed(&text).await?;
            governor.record_embedding(
                &embedding.model,
                embedding.prompt_tokens,
                embedding.latency_ms,
            );
            cache.put(&model, &text, embedding.vector.clone());
            Ok::<_, RagError>(embedding)
        });

        let embedding = handle
            .await
            .map_err(|e| RagError::Task(format!("embedding task failed: {e}")))??;
        tracing::debug!(
            model = %embedding.model,
            tokens = embedding.prompt_tokens,
            latency_ms = embedding.latency_ms,
            dims = embedding.vector.len(),
            "embedding generated"
        );
        Ok(embedding.vector)
    }
}

type GateMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// One caller's membership in a single-flight group.
struct InflightGuard<'a> {
    inflight: &'a GateMap,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // Only the last member removes the entry, and only if it is still
        // the gate this group shares. Clones are only taken under this lock.
        let last = inflight
            .get(&self.key)
            .is_some_and(|g| Arc::ptr_eq(g, &self.gate) && Arc::strong_count(&self.gate) == 2);
        if last {
            inflight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, GovernorConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProvider {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model(&self) -> &str {
            "text-embedding-3-small"
        }

        async fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RagError::Upstream {
                    status: 500,
                    body: "down".into(),
                });
            }
            Ok(Embedding {
                vector: vec![text.len() as f32, 1.0],
                prompt_tokens: 8,
                model: "text-embedding-3-small".into(),
                latency_ms: 1,
            })
        }
    }

    fn embedder(provider: Arc<CountingProvider>, governor: GovernorConfig) -> Embedder {
        Embedder::new(
            provider,
            Arc::new(EmbeddingCache::new(&CacheConfig::default())),
            Arc::new(Governor::in_memory(governor)),
        )
    }

    fn provider(delay_ms: u64, fail: bool) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }

    #[tokio::test]
    async fn second_embed_is_served_from_cache() {
        let p = provider(0, false);
        let e = embedder(p.clone(), GovernorConfig::default());

        let a = e.embed("intermittent fasting").await.unwrap();
        let b = e.embed("intermittent fasting").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        assert_eq!(e.governor.usage_stats().total_embeddings, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_identical_requests_share_one_call() {
        let p = provider(50, false);
        let e = Arc::new(embedder(p.clone(), GovernorConfig::default()));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let e = Arc::clone(&e);
                tokio::spawn(async move { e.embed("electrolytes during a fast").await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let p = provider(0, true);
        let e = embedder(p.clone(), GovernorConfig::default());

        assert!(e.embed("x").await.is_err());
        assert!(e.embed("x").await.is_err());
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
        assert_eq!(e.governor.usage_stats().total_embeddings, 0);
    }

    #[tokio::test]
    async fn window_exhaustion_blocks_without_calling_provider() {
        let p = provider(0, false);
        let e = embedder(
            p.clone(),
            GovernorConfig {
                max_daily_embedding_requests: 2,
                ..GovernorConfig::default()
            },
        );

        e.embed("one").await.unwrap();
        e.embed("two").await.unwrap();
        let err = e.embed("three").await.unwrap_err();

        assert!(err.is_exhaustion());
        assert_eq!(p.calls.load(Ordering::SeqCst), 2);
        // Cached text is still served once the window is full
        assert!(e.embed("one").await.is_ok());
    }

    #[tokio::test]
    async fn cancelled_leader_still_caches_and_releases_its_gate() {
        let p = provider(200, false);
        let e = embedder(p.clone(), GovernorConfig::default());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), e.embed("magnesium glycinate")).await;
        assert!(abandoned.is_err());
        assert_eq!(e.inflight_len(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(e.cache.peek("text-embedding-3-small", "magnesium glycinate").is_some());
        assert_eq!(e.governor.usage_stats().total_embeddings, 1);

        e.embed("magnesium glycinate").await.unwrap();
        assert_eq!(p.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn gate_outlives_members_that_leave_early() {
        let e = embedder(provider(0, false), GovernorConfig::default());

        let first = e.join("k");
        let second = e.join("k");
        assert!(Arc::ptr_eq(&first.gate, &second.gate));

        drop(first);
        assert_eq!(e.inflight_len(), 1);
        let late = e.join("k");
        assert!(Arc::ptr_eq(&late.gate, &second.gate));

        drop(second);
        drop(late);
        assert_eq!(e.inflight_len(), 0);

        // A fresh group after the old one is gone is not removed by a stale guard
        let stale = InflightGuard {
            inflight: &e.inflight,
            key: "k".into(),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        };
        let fresh = e.join("k");
        drop(stale);
        assert_eq!(e.inflight_len(), 1);
        drop(fresh);
        assert_eq!(e.inflight_len(), 0);
    }
}
