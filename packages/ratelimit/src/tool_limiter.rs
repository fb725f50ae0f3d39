// ABOUTME: Per-tool rate limiting across global, team, and agent scopes
// ABOUTME: Every configured scope must allow; the tightest scope is reported

use crate::limiter::Limiter;
use crate::tool_store::ToolRateLimitStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octroi_storage::StorageError;
use std::sync::Arc;

/// Resolution of the (global, team, agent) rates for a tool, implemented
/// by [`ToolRateLimitStore`] and by in-memory fakes in tests.
#[async_trait]
pub trait RateResolver: Send + Sync {
    async fn resolve(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> Result<(i32, i32, i32), StorageError>;
}

#[async_trait]
impl RateResolver for ToolRateLimitStore {
    async fn resolve(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> Result<(i32, i32, i32), StorageError> {
        ToolRateLimitStore::resolve(self, tool_id, team, agent_id).await
    }
}

/// The outcome of a tool rate-limit check: whether all configured scopes
/// allowed the request, and the tightest scope's bucket state for headers.
#[derive(Debug, Clone, Copy)]
pub struct ToolRateDecision {
    pub allowed: bool,
    pub limit: i32,
    pub remaining: i32,
    pub reset_at: DateTime<Utc>,
}

/// Checks per-tool rate limits against the shared in-memory limiter.
pub struct ToolRateLimiter {
    resolver: Arc<dyn RateResolver>,
    limiter: Arc<Limiter>,
}

impl ToolRateLimiter {
    pub fn new(resolver: Arc<dyn RateResolver>, limiter: Arc<Limiter>) -> Self {
        Self { resolver, limiter }
    }

    /// Resolve the applicable rates for the tool and check all non-zero
    /// scope buckets. All must allow for the request to proceed. Returns
    /// `None` when no tool-level rate limit is configured at any scope.
    pub async fn check(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> Result<Option<ToolRateDecision>, StorageError> {
        let (global_rate, team_rate, agent_rate) =
            self.resolver.resolve(tool_id, team, agent_id).await?;

        let mut checks: Vec<(String, i32)> = Vec::new();
        if global_rate > 0 {
            checks.push((format!("tool:{tool_id}"), global_rate));
        }
        if team_rate > 0 && !team.is_empty() {
            checks.push((format!("tool:{tool_id}:team:{team}"), team_rate));
        }
        if agent_rate > 0 {
            checks.push((format!("tool:{tool_id}:agent:{agent_id}"), agent_rate));
        }

        if checks.is_empty() {
            return Ok(None);
        }

        let mut decision: Option<ToolRateDecision> = None;
        let mut allowed = true;
        for (key, rate) in &checks {
            if !self.limiter.allow(key, *rate) {
                allowed = false;
            }
            let (limit, remaining, reset_at) = self.limiter.status(key, *rate);
            // Track the tightest scope so callers see the binding constraint.
            if decision.map_or(true, |d| limit < d.limit) {
                decision = Some(ToolRateDecision {
                    allowed,
                    limit,
                    remaining,
                    reset_at,
                });
            }
        }

        let mut decision = decision.expect("at least one scope was checked");
        decision.allowed = allowed;
        Ok(Some(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FixedRates {
        global: i32,
        team: i32,
        agent: i32,
    }

    #[async_trait]
    impl RateResolver for FixedRates {
        async fn resolve(
            &self,
            _tool_id: &str,
            _team: &str,
            _agent_id: &str,
        ) -> Result<(i32, i32, i32), StorageError> {
            Ok((self.global, self.team, self.agent))
        }
    }

    fn tool_limiter(global: i32, team: i32, agent: i32) -> ToolRateLimiter {
        ToolRateLimiter::new(
            Arc::new(FixedRates {
                global,
                team,
                agent,
            }),
            Arc::new(Limiter::new(60, Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn no_scopes_configured_means_no_limit() {
        let trl = tool_limiter(0, 0, 0);
        let decision = trl.check("t1", "alpha", "a1").await.unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn tightest_scope_is_reported() {
        let trl = tool_limiter(100, 10, 2);
        let decision = trl.check("t1", "alpha", "a1").await.unwrap().unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 2);
    }

    #[tokio::test]
    async fn agent_scope_denies_after_its_budget() {
        let trl = tool_limiter(100, 10, 2);
        for _ in 0..2 {
            let decision = trl.check("t1", "alpha", "a1").await.unwrap().unwrap();
            assert!(decision.allowed);
        }
        let decision = trl.check("t1", "alpha", "a1").await.unwrap().unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 2);
    }

    #[tokio::test]
    async fn empty_team_skips_team_scope() {
        let trl = tool_limiter(0, 1, 0);
        // Team rate is configured but the agent has no team: nothing applies.
        let decision = trl.check("t1", "", "a1").await.unwrap();
        assert!(decision.is_none());
    }

    #[tokio::test]
    async fn single_scope_denial_rejects() {
        let trl = tool_limiter(1, 0, 5);
        let first = trl.check("t1", "", "a1").await.unwrap().unwrap();
        assert!(first.allowed);
        assert_eq!(first.limit, 1);

        let second = trl.check("t1", "", "a1").await.unwrap().unwrap();
        assert!(!second.allowed, "global scope exhausted");
    }

    #[tokio::test]
    async fn scopes_are_isolated_per_agent() {
        let trl = tool_limiter(0, 0, 1);
        assert!(trl.check("t1", "", "a1").await.unwrap().unwrap().allowed);
        assert!(!trl.check("t1", "", "a1").await.unwrap().unwrap().allowed);
        // Another agent has a fresh bucket.
        assert!(trl.check("t1", "", "a2").await.unwrap().unwrap().allowed);
    }
}
