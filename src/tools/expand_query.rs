//! MCP `expand_query` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `expand_query` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExpandQueryParams {
    /// The user's question.
    #[schemars(description = "The user's question in natural language")]
    pub query: String,

    /// Health topic the query is about.
    #[schemars(
        description = "Health topic: 'fasting', 'nutrition', 'exercise', 'sleep', 'weight', 'hydration', 'mental_health', 'general'"
    )]
    pub query_type: Option<String>,

    /// The user's current goals, most important first.
    #[schemars(description = "The user's current goals, most important first")]
    pub goals: Option<Vec<String>>,
}
