// ABOUTME: Postgres-backed store for per-tool rate-limit overrides
// ABOUTME: Team- and agent-scoped rows plus resolution of effective rates

use octroi_storage::{StorageError, StorageResult};
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A team- or agent-scoped rate-limit override for a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolRateOverride {
    pub id: String,
    pub tool_id: String,
    pub scope: String,
    pub scope_id: String,
    pub rate_limit: i32,
}

/// CRUD over `tool_rate_limits` and resolution of the effective rates for
/// a (tool, team, agent) triple.
#[derive(Clone)]
pub struct ToolRateLimitStore {
    pool: PgPool,
}

impl ToolRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_by_tool(&self, tool_id: &str) -> StorageResult<Vec<ToolRateOverride>> {
        let rows = sqlx::query(
            "SELECT id, tool_id, scope, scope_id, rate_limit \
             FROM tool_rate_limits WHERE tool_id = $1 ORDER BY scope, scope_id",
        )
        .bind(tool_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ToolRateOverride {
                    id: row.try_get("id")?,
                    tool_id: row.try_get("tool_id")?,
                    scope: row.try_get("scope")?,
                    scope_id: row.try_get("scope_id")?,
                    rate_limit: row.try_get("rate_limit")?,
                })
            })
            .collect()
    }

    /// Upsert an override for a tool+scope+scope_id combination.
    pub async fn set(
        &self,
        tool_id: &str,
        scope: &str,
        scope_id: &str,
        rate: i32,
    ) -> StorageResult<()> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO tool_rate_limits (id, tool_id, scope, scope_id, rate_limit) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (tool_id, scope, scope_id) DO UPDATE SET rate_limit = EXCLUDED.rate_limit",
        )
        .bind(&id)
        .bind(tool_id)
        .bind(scope)
        .bind(scope_id)
        .bind(rate)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, tool_id: &str, scope: &str, scope_id: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "DELETE FROM tool_rate_limits WHERE tool_id = $1 AND scope = $2 AND scope_id = $3",
        )
        .bind(tool_id)
        .bind(scope)
        .bind(scope_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Effective rates for a tool across all three scopes. The global rate
    /// comes from `tools.rate_limit`; team and agent rates from the
    /// override table. Zero means no limit configured for that scope.
    pub async fn resolve(
        &self,
        tool_id: &str,
        team: &str,
        agent_id: &str,
    ) -> StorageResult<(i32, i32, i32)> {
        let row = sqlx::query(
            "SELECT \
                COALESCE(t.rate_limit, 0) AS global_rate, \
                COALESCE((SELECT trl.rate_limit FROM tool_rate_limits trl \
                          WHERE trl.tool_id = t.id AND trl.scope = 'team' AND trl.scope_id = $2), 0) AS team_rate, \
                COALESCE((SELECT trl.rate_limit FROM tool_rate_limits trl \
                          WHERE trl.tool_id = t.id AND trl.scope = 'agent' AND trl.scope_id = $3), 0) AS agent_rate \
             FROM tools t WHERE t.id = $1",
        )
        .bind(tool_id)
        .bind(team)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Ok((
            row.try_get("global_rate")?,
            row.try_get("team_rate")?,
            row.try_get("agent_rate")?,
        ))
    }
}
