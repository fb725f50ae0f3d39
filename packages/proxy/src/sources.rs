// ABOUTME: Trait seams between the proxy and its collaborators
// ABOUTME: Tool lookup, budget checks, transaction sink, and tool rate limits

use async_trait::async_trait;
use octroi_agents::{BudgetDecision, BudgetStore, GlobalBudgetDecision};
use octroi_metering::{Collector, Transaction};
use octroi_ratelimit::{ToolRateDecision, ToolRateLimiter};
use octroi_registry::{Tool, ToolStore};
use octroi_storage::StorageError;

/// Lookup of tools by id.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Tool, StorageError>;
}

#[async_trait]
impl ToolSource for ToolStore {
    async fn get_by_id(&self, id: &str) -> Result<Tool, StorageError> {
        ToolStore::get_by_id(self, id).await
    }
}

/// Agent and global tool budget checks.
#[async_trait]
pub trait BudgetSource: Send + Sync {
    async fn check_budget(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<BudgetDecision, StorageError>;

    async fn check_tool_global_budget(
        &self,
        tool_id: &str,
    ) -> Result<GlobalBudgetDecision, StorageError>;
}

#[async_trait]
impl BudgetSource for BudgetStore {
    async fn check_budget(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> Result<BudgetDecision, StorageError> {
        BudgetStore::check_budget(self, agent_id, tool_id).await
    }

    async fn check_tool_global_budget(
        &self,
        tool_id: &str,
    ) -> Result<GlobalBudgetDecision, StorageError> {
        BudgetStore::check_tool_global_budget(self, tool_id).await
    }
}

/// Destination for recorded transactions. Recording is synchronous and
/// must not block: the collector only appends to its in-memory buffer.
pub trait TransactionSink: Send + Sync {
    fn record(&self, tx: Transaction);
}

impl TransactionSink for Collector {
    fn record(&self, tx: Transaction) {
        Collector::record(self, tx)
    }
}

/// Per-tool rate limit checks across global/team/agent scopes.
#[async_trait]
pub trait ToolRateLimitSource: Send + Sync {
    async fn check(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> Result<Option<ToolRateDecision>, StorageError>;
}

#[async_trait]
impl ToolRateLimitSource for ToolRateLimiter {
    async fn check(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> Result<Option<ToolRateDecision>, StorageError> {
        ToolRateLimiter::check(self, tool_id, team, agent_id).await
    }
}

/// Optional proxy-level metric callbacks. All methods default to no-ops so
/// implementations override only what they report.
pub trait MetricsHook: Send + Sync {
    fn proxy_request(&self, _tool_id: &str, _method: &str, _status: u16) {}
    fn upstream_duration(&self, _tool_id: &str, _seconds: f64) {}
    fn budget_rejection(&self, _scope: &'static str) {}
    fn tool_rate_limit_rejection(&self) {}
    fn upstream_error(&self, _kind: &'static str, _tool_id: &str) {}
}
