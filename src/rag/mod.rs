//! Retrieval-augmented generation pipeline.
//!
//! [`RagPipeline`] is the public facade. A request runs sequentially:
//!
//! 1. [`expand`]: key terms, related concepts, expanded query
//! 2. [`retrieve`]: embed (cached, single-flight) and query the vector index
//! 3. [`rank`]: multi-factor re-ranking
//! 4. [`context`]: character-bounded context assembly
//! 5. [`respond`]: grounded or fallback answer
//!
//! Every stage is best-effort. A provider or index failure never surfaces as
//! an error here; it becomes the stage's documented fallback value plus a
//! [`Degradation`] reason.

pub mod context;
pub mod expand;
pub mod rank;
pub mod respond;
pub mod retrieve;
pub mod types;

use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;

use crate::completion::{Completer, OpenAiCompletionClient};
use crate::config::GroundworkConfig;
use crate::embedding::remote::RemoteEmbeddingProvider;
use crate::embedding::{CacheStats, Embedder, EmbeddingCache};
use crate::error::Result;
use crate::governor::{ApiUsageStats, BudgetWarning, Governor, UsageStore, WarningSeverity};
use crate::index::{HttpVectorIndex, VectorIndex};
use expand::QueryExpander;
use respond::ResponseGenerator;
use retrieve::Retriever;
pub use types::{
    ContextualizedQuery, Degradation, GeneratedResponse, HealthQueryContext, KnowledgeDocument,
    Outcome, QueryType, ResponsePath, SearchOptions, SearchResult,
};

/// Cache hit rate below which a warning is raised.
const LOW_HIT_RATE: f64 = 0.2;
/// Lookups needed before the hit rate is meaningful.
const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 20;

pub struct RagPipeline {
    expander: QueryExpander,
    retriever: Retriever,
    generator: ResponseGenerator,
    embedder: Arc<Embedder>,
    governor: Arc<Governor>,
    context_max_length: usize,
    default_options: SearchOptions,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<Embedder>,
        completer: Arc<Completer>,
        index: Arc<dyn VectorIndex>,
        governor: Arc<Governor>,
        config: &GroundworkConfig,
    ) -> Self {
        Self {
            expander: QueryExpander::new(Arc::clone(&completer)),
            retriever: Retriever::new(
                Arc::clone(&embedder),
                index,
                config.retrieval.health_confidence_floor,
            ),
            generator: ResponseGenerator::new(completer),
            embedder,
            governor,
            context_max_length: config.retrieval.context_max_length,
            default_options: SearchOptions::from_config(&config.retrieval),
        }
    }

    /// Wire the HTTP providers, the cache, and a governor persisting to `store`.
    pub fn from_config(config: &GroundworkConfig, store: Arc<dyn UsageStore>) -> Result<Self> {
        config.validate()?;

        let governor = Arc::new(Governor::new(config.governor.clone(), store));
        let cache = Arc::new(EmbeddingCache::new(&config.cache));
        let embedder = Arc::new(Embedder::new(
            Arc::new(RemoteEmbeddingProvider::new(&config.embedding, &config.governor)?),
            cache,
            Arc::clone(&governor),
        ));
        let completer = Arc::new(Completer::new(
            Arc::new(OpenAiCompletionClient::new(&config.completion, &config.governor)?),
            Arc::clone(&governor),
            &config.completion,
        ));
        let index: Arc<dyn VectorIndex> =
            Arc::new(HttpVectorIndex::new(&config.index, &config.governor)?);

        tracing::info!(
            embedding_model = %config.embedding.model,
            completion_model = %config.completion.model,
            namespace = %config.index.namespace,
            daily_budget = config.governor.daily_budget,
            "RAG pipeline ready"
        );
        Ok(Self::new(embedder, completer, index, governor, config))
    }

    pub fn default_search_options(&self) -> SearchOptions {
        self.default_options.clone()
    }

    pub async fn expand(
        &self,
        query: &str,
        context: Option<&HealthQueryContext>,
    ) -> Outcome<ContextualizedQuery> {
        self.expander.expand(query, context).await
    }

    /// Ranked results for `query`. Empty on any embedding or index failure.
    pub async fn search(
        &self,
        query: &str,
        context: Option<&HealthQueryContext>,
        options: &SearchOptions,
    ) -> Outcome<Vec<SearchResult>> {
        let (expanded, expand_degraded) = self.expand(query, context).await.into_parts();
        let (candidates, retrieve_degraded) =
            self.retriever.retrieve(&expanded, options).await.into_parts();

        let results = rank::rank(candidates, &expanded, options.max_results, Utc::now());
        tracing::info!(
            results = results.len(),
            top_relevance = results.first().map(|r| r.relevance_score).unwrap_or(0.0),
            "search complete"
        );

        Outcome {
            value: results,
            degraded: retrieve_degraded.or(expand_degraded),
        }
    }

    /// Search, assemble context, and answer. Always returns a response.
    pub async fn generate_contextualized_response(
        &self,
        query: &str,
        context: Option<&HealthQueryContext>,
        options: &SearchOptions,
    ) -> GeneratedResponse {
        let request_id = uuid::Uuid::now_v7().to_string();
        let span = tracing::info_span!("rag_request", request_id = %request_id);

        async move {
            let (results, search_degraded) =
                self.search(query, context, options).await.into_parts();
            let assembled = context::assemble_context(&results, self.context_max_length);
            let response = self
                .generator
                .generate(request_id, query, context, &results, &assembled, search_degraded)
                .await;

            tracing::info!(
                path = ?response.path,
                sources = response.sources.len(),
                degraded = response.degraded.is_some(),
                "response generated"
            );
            response
        }
        .instrument(span)
        .await
    }

    pub fn usage_stats(&self) -> ApiUsageStats {
        self.governor.usage_stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.embedder.cache().stats()
    }

    pub fn governor(&self) -> &Arc<Governor> {
        &self.governor
    }

    /// Governor warnings plus a low cache hit rate notice.
    pub fn budget_warnings(&self) -> Vec<BudgetWarning> {
        let mut warnings = self.governor.budget_warnings();
        let cache = self.cache_stats();
        if cache.hits + cache.misses >= MIN_LOOKUPS_FOR_HIT_RATE && cache.hit_rate < LOW_HIT_RATE {
            warnings.push(BudgetWarning::new(
                WarningSeverity::Info,
                format!(
                    "Embedding cache hit rate is {:.0}% over {} lookups; repeated queries may be \
                     phrased inconsistently.",
                    cache.hit_rate * 100.0,
                    cache.hits + cache.misses
                ),
            ));
        }
        warnings
    }
}
