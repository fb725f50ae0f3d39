// ABOUTME: Metering type definitions
// ABOUTME: Transaction records and usage query/aggregate structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded proxied call with its outcome, sizes, latency, and cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: String,
    pub agent_id: String,
    pub tool_id: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub latency_ms: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub success: bool,
    pub cost: f64,
    /// "reported" when the upstream supplied a cost header, "flat" otherwise.
    pub cost_source: String,
    #[serde(default)]
    pub error: String,
}

/// Aggregate metrics over a set of transactions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub total_requests: i64,
    pub total_cost: f64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_latency_ms: f64,
}

/// Filters and pagination for querying transactions.
#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub agent_id: Option<String>,
    /// Team-scoped queries pass the team's agent ids instead.
    pub agent_ids: Vec<String>,
    pub tool_id: Option<String>,
    pub tool_ids: Vec<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub cursor: Option<String>,
    pub limit: i64,
}
