//! MCP `usage_stats` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `usage_stats` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UsageStatsParams {
    /// Include per-day history. Defaults to `false`.
    #[schemars(description = "If true, include the per-day history (up to 30 days). Defaults to false.")]
    pub include_history: Option<bool>,
}
