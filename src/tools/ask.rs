//! MCP `ask` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `ask` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AskParams {
    #[schemars(description = "The user's question in natural language")]
    pub query: String,

    #[schemars(description = "Opaque identifier of the user asking, used for logging only")]
    pub user_id: Option<String>,

    #[schemars(
        description = "Health topic: 'fasting', 'nutrition', 'exercise', 'sleep', 'weight', 'hydration', 'mental_health', 'general'"
    )]
    pub query_type: Option<String>,

    #[schemars(description = "The user's current goals, most important first")]
    pub goals: Option<Vec<String>>,

    #[schemars(description = "Dietary restrictions the answer must respect (e.g. 'vegetarian')")]
    pub dietary_restrictions: Option<Vec<String>>,

    #[schemars(description = "Maximum number of source documents to ground the answer on (1-20). Defaults to 5.")]
    pub max_results: Option<usize>,
}
