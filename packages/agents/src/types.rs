// ABOUTME: Agent and budget type definitions
// ABOUTME: Structures for API agents and their spending limits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered API agent. The key hash never leaves the server; the
/// prefix is kept for display so operators can match keys to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub api_key_prefix: String,
    pub team: String,
    pub rate_limit: i32,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a new agent.
#[derive(Debug, Clone)]
pub struct CreateAgentInput {
    pub name: String,
    pub api_key_hash: String,
    pub api_key_prefix: String,
    pub team: String,
    pub rate_limit: i32,
}

/// Optional fields for a partial agent update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAgentInput {
    pub name: Option<String>,
    pub team: Option<String>,
    pub rate_limit: Option<i32>,
}

/// Cursor-based pagination controls for listing agents.
#[derive(Debug, Clone, Default)]
pub struct AgentListParams {
    pub cursor: Option<String>,
    pub limit: i64,
}

/// A per-agent, per-tool spending limit. A limit of zero means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub agent_id: String,
    pub tool_id: String,
    pub daily_limit: f64,
    pub monthly_limit: f64,
}

/// Fields required to create or upsert a budget.
#[derive(Debug, Clone, Deserialize)]
pub struct SetBudgetInput {
    pub agent_id: String,
    pub tool_id: String,
    #[serde(default)]
    pub daily_limit: f64,
    #[serde(default)]
    pub monthly_limit: f64,
}
