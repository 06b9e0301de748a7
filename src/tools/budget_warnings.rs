//! MCP `budget_warnings` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `budget_warnings` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BudgetWarningsParams {
    /// Lowest severity to report: `"info"`, `"warning"`, or `"critical"`.
    #[schemars(description = "Lowest severity to report: 'info', 'warning', 'critical'. Defaults to 'info'.")]
    pub min_severity: Option<String>,
}
