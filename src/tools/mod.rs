pub mod ask;
pub mod budget_warnings;
pub mod expand_query;
pub mod search_knowledge;
pub mod usage_stats;

use ask::AskParams;
use budget_warnings::BudgetWarningsParams;
use expand_query::ExpandQueryParams;
use groundwork::governor::usage::day_key;
use groundwork::governor::WarningSeverity;
use groundwork::rag::{HealthQueryContext, QueryType, RagPipeline, SearchOptions};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_knowledge::SearchKnowledgeParams;
use std::sync::Arc;
use usage_stats::UsageStatsParams;

const MAX_RESULTS_CAP: usize = 20;

/// Build a health context from tool arguments. `None` when the caller gave
/// neither a topic nor goals.
fn build_context(
    user_id: Option<String>,
    query_type: Option<&str>,
    goals: Option<Vec<String>>,
    restrictions: Option<Vec<String>>,
) -> Result<Option<HealthQueryContext>, String> {
    let goals = goals.unwrap_or_default();
    let restrictions = restrictions.unwrap_or_default();
    if query_type.is_none() && goals.is_empty() && restrictions.is_empty() {
        return Ok(None);
    }
    let query_type = match query_type {
        Some(t) => t.parse::<QueryType>()?,
        None => QueryType::General,
    };
    Ok(Some(
        HealthQueryContext::new(user_id.unwrap_or_else(|| "anonymous".into()), query_type)
            .with_goals(goals)
            .with_restrictions(restrictions),
    ))
}

fn validate_query(query: &str) -> Result<(), String> {
    if query.trim().is_empty() {
        return Err("query must not be empty".into());
    }
    Ok(())
}

fn clamp_max_results(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_RESULTS_CAP)
}

/// The groundwork MCP tool handler. Holds the shared RAG pipeline and exposes
/// it via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct GroundworkTools {
    tool_router: ToolRouter<Self>,
    pipeline: Arc<RagPipeline>,
}

#[tool_router]
impl GroundworkTools {
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            pipeline,
        }
    }

    /// Expand a question into key terms, related concepts, and a search query.
    #[tool(description = "Expand a question into key terms, related concepts, and the expanded search query used for retrieval.")]
    async fn expand_query(
        &self,
        Parameters(params): Parameters<ExpandQueryParams>,
    ) -> Result<String, String> {
        validate_query(&params.query)?;
        let context = build_context(None, params.query_type.as_deref(), params.goals, None)?;

        tracing::info!(query_len = params.query.len(), "expand_query called");
        let outcome = self.pipeline.expand(&params.query, context.as_ref()).await;

        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Search the knowledge base.
    #[tool(description = "Search the health knowledge base. Returns documents ranked by similarity, confidence, topic match, and recency.")]
    async fn search_knowledge(
        &self,
        Parameters(params): Parameters<SearchKnowledgeParams>,
    ) -> Result<String, String> {
        validate_query(&params.query)?;
        if let Some(min) = params.min_similarity {
            if !(0.0..=1.0).contains(&min) {
                return Err("min_similarity must be between 0.0 and 1.0".into());
            }
        }
        let context = build_context(None, params.query_type.as_deref(), params.goals, None)?;

        let defaults = self.pipeline.default_search_options();
        let options = SearchOptions {
            max_results: clamp_max_results(params.max_results, defaults.max_results),
            min_similarity: params.min_similarity.unwrap_or(defaults.min_similarity),
            category_filter: params.categories.unwrap_or_default(),
            tag_filter: params.tags.unwrap_or_default(),
        };

        tracing::info!(
            query_len = params.query.len(),
            max_results = options.max_results,
            "search_knowledge called"
        );
        let outcome = self
            .pipeline
            .search(&params.query, context.as_ref(), &options)
            .await;

        serde_json::to_string(&serde_json::json!({
            "results": outcome.value,
            "total": outcome.value.len(),
            "degraded": outcome.degraded,
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Answer a question grounded in the knowledge base.
    #[tool(description = "Answer a health or wellness question grounded in the knowledge base. Falls back to an explicit 'no specific information' answer when nothing relevant is found.")]
    async fn ask(&self, Parameters(params): Parameters<AskParams>) -> Result<String, String> {
        validate_query(&params.query)?;
        let context = build_context(
            params.user_id,
            params.query_type.as_deref(),
            params.goals,
            params.dietary_restrictions,
        )?;

        let mut options = self.pipeline.default_search_options();
        options.max_results = clamp_max_results(params.max_results, options.max_results);

        tracing::info!(query_len = params.query.len(), "ask called");
        let response = self
            .pipeline
            .generate_contextualized_response(&params.query, context.as_ref(), &options)
            .await;

        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Report today's API usage.
    #[tool(description = "Get today's API usage: request counts, tokens, estimated cost, per-model breakdown, and embedding cache statistics.")]
    async fn usage_stats(
        &self,
        Parameters(params): Parameters<UsageStatsParams>,
    ) -> Result<String, String> {
        let mut stats = self.pipeline.usage_stats();
        if !params.include_history.unwrap_or(false) {
            let today = day_key(stats.day);
            stats.by_day.retain(|day, _| *day == today);
        }
        let windows = self.pipeline.governor().window_status();

        serde_json::to_string(&serde_json::json!({
            "usage": stats,
            "budget_state": self.pipeline.governor().state(),
            "daily_budget": self.pipeline.governor().config().daily_budget,
            "windows": windows,
            "cache": self.pipeline.cache_stats(),
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Report budget, rate, and cache warnings.
    #[tool(description = "Get warnings about spend and request volume approaching or exceeding their daily limits, plus cache efficiency notices.")]
    async fn budget_warnings(
        &self,
        Parameters(params): Parameters<BudgetWarningsParams>,
    ) -> Result<String, String> {
        let min = match params.min_severity.as_deref() {
            Some(s) => s.parse::<WarningSeverity>()?,
            None => WarningSeverity::Info,
        };
        let warnings: Vec<_> = self
            .pipeline
            .budget_warnings()
            .into_iter()
            .filter(|w| w.severity >= min)
            .collect();

        serde_json::to_string(&serde_json::json!({
            "warnings": warnings,
            "total": warnings.len(),
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for GroundworkTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "groundwork answers health and wellness questions from a curated knowledge base. \
                 Use ask for a grounded answer, search_knowledge to inspect sources, and \
                 usage_stats or budget_warnings to check remaining API budget."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
