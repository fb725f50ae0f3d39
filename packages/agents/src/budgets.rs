// ABOUTME: Budget storage and enforcement over the transaction log
// ABOUTME: Per-agent-per-tool limits and global per-tool limits on UTC windows

use crate::types::{Budget, SetBudgetInput};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use octroi_storage::{StorageError, StorageResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const BUDGET_COLUMNS: &str = "id, agent_id, tool_id, daily_limit::float8 AS daily_limit, \
     monthly_limit::float8 AS monthly_limit";

/// Outcome of a per-agent budget check. Remaining amounts are clamped at
/// zero and only meaningful for non-zero limits.
#[derive(Debug, Clone, Copy)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub remaining_daily: f64,
    pub remaining_monthly: f64,
}

/// Outcome of a global per-tool budget check.
#[derive(Debug, Clone, Copy)]
pub struct GlobalBudgetDecision {
    pub allowed: bool,
    pub remaining: f64,
}

/// Database operations for agent-tool budgets and budget enforcement.
#[derive(Clone)]
pub struct BudgetStore {
    pool: PgPool,
}

impl BudgetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn scan_budget(row: &PgRow) -> StorageResult<Budget> {
        Ok(Budget {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            tool_id: row.try_get("tool_id")?,
            daily_limit: row.try_get("daily_limit")?,
            monthly_limit: row.try_get("monthly_limit")?,
        })
    }

    /// Upsert the budget for an agent/tool pair.
    pub async fn set(&self, input: SetBudgetInput) -> StorageResult<Budget> {
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO agent_tool_budgets (id, agent_id, tool_id, daily_limit, monthly_limit) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (agent_id, tool_id) \
             DO UPDATE SET daily_limit = EXCLUDED.daily_limit, monthly_limit = EXCLUDED.monthly_limit \
             RETURNING {BUDGET_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&input.agent_id)
            .bind(&input.tool_id)
            .bind(input.daily_limit)
            .bind(input.monthly_limit)
            .fetch_one(&self.pool)
            .await?;
        Self::scan_budget(&row)
    }

    pub async fn get(&self, agent_id: &str, tool_id: &str) -> StorageResult<Option<Budget>> {
        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM agent_tool_budgets \
             WHERE agent_id = $1 AND tool_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(agent_id)
            .bind(tool_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::scan_budget).transpose()
    }

    pub async fn list_by_agent(&self, agent_id: &str) -> StorageResult<Vec<Budget>> {
        let sql = format!(
            "SELECT {BUDGET_COLUMNS} FROM agent_tool_budgets \
             WHERE agent_id = $1 ORDER BY tool_id"
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::scan_budget).collect()
    }

    pub async fn delete(&self, agent_id: &str, tool_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM agent_tool_budgets WHERE agent_id = $1 AND tool_id = $2")
            .bind(agent_id)
            .bind(tool_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Check the agent's daily and monthly spend for a tool against its
    /// configured limits. An absent budget row or a zero limit means
    /// unlimited. Spend is summed from the transaction log, so the result
    /// lags metering flushes by design.
    pub async fn check_budget(
        &self,
        agent_id: &str,
        tool_id: &str,
    ) -> StorageResult<BudgetDecision> {
        let budget = match self.get(agent_id, tool_id).await? {
            Some(budget) => budget,
            None => {
                return Ok(BudgetDecision {
                    allowed: true,
                    remaining_daily: 0.0,
                    remaining_monthly: 0.0,
                })
            }
        };

        let now = Utc::now();
        let daily_spend = self
            .sum_agent_tool_spend(agent_id, tool_id, day_start(now))
            .await?;
        let monthly_spend = self
            .sum_agent_tool_spend(agent_id, tool_id, month_start(now))
            .await?;

        Ok(evaluate_budget(&budget, daily_spend, monthly_spend))
    }

    /// Check the tool-wide spend against the tool's budget_limit over its
    /// configured window. Unknown window values are treated as monthly.
    pub async fn check_tool_global_budget(
        &self,
        tool_id: &str,
    ) -> StorageResult<GlobalBudgetDecision> {
        let row = sqlx::query(
            "SELECT budget_limit::float8 AS budget_limit, budget_window \
             FROM tools WHERE id = $1",
        )
        .bind(tool_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        let budget_limit: f64 = row.try_get("budget_limit")?;
        let budget_window: String = row.try_get("budget_window")?;

        if budget_limit == 0.0 {
            return Ok(GlobalBudgetDecision {
                allowed: true,
                remaining: 0.0,
            });
        }

        let window_start = global_window_start(&budget_window, Utc::now());
        let spend: f64 = sqlx::query(
            "SELECT COALESCE(SUM(cost), 0)::float8 AS spend \
             FROM transactions WHERE tool_id = $1 AND timestamp >= $2",
        )
        .bind(tool_id)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?
        .try_get("spend")?;

        Ok(GlobalBudgetDecision {
            allowed: spend < budget_limit,
            remaining: (budget_limit - spend).max(0.0),
        })
    }

    async fn sum_agent_tool_spend(
        &self,
        agent_id: &str,
        tool_id: &str,
        since: DateTime<Utc>,
    ) -> StorageResult<f64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(cost), 0)::float8 AS spend \
             FROM transactions \
             WHERE agent_id = $1 AND tool_id = $2 AND timestamp >= $3",
        )
        .bind(agent_id)
        .bind(tool_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("spend")?)
    }
}

/// 00:00:00 UTC of the current day.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .expect("midnight UTC always exists")
}

/// Day 1, 00:00:00 UTC of the current month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month UTC always exists")
}

fn global_window_start(window: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match window {
        "daily" => day_start(now),
        // Unknown values fall back to the monthly window.
        _ => month_start(now),
    }
}

fn evaluate_budget(budget: &Budget, daily_spend: f64, monthly_spend: f64) -> BudgetDecision {
    let mut decision = BudgetDecision {
        allowed: true,
        remaining_daily: 0.0,
        remaining_monthly: 0.0,
    };

    if budget.daily_limit > 0.0 {
        decision.remaining_daily = (budget.daily_limit - daily_spend).max(0.0);
        if daily_spend >= budget.daily_limit {
            decision.allowed = false;
        }
    }
    if budget.monthly_limit > 0.0 {
        decision.remaining_monthly = (budget.monthly_limit - monthly_spend).max(0.0);
        if monthly_spend >= budget.monthly_limit {
            decision.allowed = false;
        }
    }
    decision
}
