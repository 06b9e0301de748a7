//! MCP `search_knowledge` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_knowledge` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchKnowledgeParams {
    #[schemars(description = "Natural language query to search the knowledge base")]
    pub query: String,

    /// Supplying a topic also restricts results to high-confidence documents.
    #[schemars(
        description = "Health topic: 'fasting', 'nutrition', 'exercise', 'sleep', 'weight', 'hydration', 'mental_health', 'general'. Supplying it boosts matching documents and restricts results to high-confidence ones."
    )]
    pub query_type: Option<String>,

    #[schemars(description = "The user's current goals, most important first")]
    pub goals: Option<Vec<String>>,

    /// Maximum number of results (1-20). Defaults to `retrieval.default_max_results`.
    #[schemars(description = "Maximum number of results to return (1-20). Defaults to 5.")]
    pub max_results: Option<usize>,

    /// Minimum raw similarity (0.0-1.0). Defaults to `retrieval.min_similarity`.
    #[schemars(description = "Minimum vector similarity (0.0-1.0). Defaults to 0.7.")]
    pub min_similarity: Option<f64>,

    #[schemars(description = "Only return documents in these categories")]
    pub categories: Option<Vec<String>>,

    #[schemars(description = "Only return documents carrying at least one of these tags")]
    pub tags: Option<Vec<String>>,
}
