// ABOUTME: Postgres-backed store for agent accounts
// ABOUTME: Key-hash lookup for authentication plus CRUD and key rotation

use crate::types::{Agent, AgentListParams, CreateAgentInput, UpdateAgentInput};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use octroi_storage::{StorageError, StorageResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 20;

const AGENT_COLUMNS: &str =
    "id, name, api_key_hash, api_key_prefix, team, rate_limit, created_at";

#[derive(Clone)]
pub struct AgentStore {
    pool: PgPool,
}

impl AgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn scan_agent(row: &PgRow) -> StorageResult<Agent> {
        Ok(Agent {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            api_key_hash: row.try_get("api_key_hash")?,
            api_key_prefix: row.try_get("api_key_prefix")?,
            team: row.try_get("team")?,
            rate_limit: row.try_get("rate_limit")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn create(&self, input: CreateAgentInput) -> StorageResult<Agent> {
        let id = Uuid::new_v4().to_string();
        let sql = format!(
            "INSERT INTO agents (id, name, api_key_hash, api_key_prefix, team, rate_limit) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {AGENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&input.name)
            .bind(&input.api_key_hash)
            .bind(&input.api_key_prefix)
            .bind(&input.team)
            .bind(input.rate_limit)
            .fetch_one(&self.pool)
            .await?;
        Self::scan_agent(&row)
    }

    pub async fn get_by_id(&self, id: &str) -> StorageResult<Agent> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::scan_agent(&row)
    }

    /// Authentication lookup by hex-encoded SHA-256 key hash.
    pub async fn get_by_key_hash(&self, hash: &str) -> StorageResult<Option<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE api_key_hash = $1");
        let row = sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::scan_agent).transpose()
    }

    /// Page of agents ordered by `created_at DESC, id DESC`. An optional
    /// team filter restricts results to the given teams.
    pub async fn list(
        &self,
        teams: Option<&[String]>,
        params: AgentListParams,
    ) -> StorageResult<(Vec<Agent>, Option<String>)> {
        let limit = if params.limit > 0 {
            params.limit
        } else {
            DEFAULT_LIMIT
        };

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {AGENT_COLUMNS} FROM agents"));
        let mut has_where = false;

        if let Some(teams) = teams {
            qb.push(" WHERE team = ANY(");
            qb.push_bind(teams.to_vec());
            qb.push(")");
            has_where = true;
        }

        if let Some(cursor) = params.cursor.as_deref() {
            let (cursor_time, cursor_id) = decode_cursor(cursor)?;
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push("(created_at, id) < (");
            qb.push_bind(cursor_time);
            qb.push(", ");
            qb.push_bind(cursor_id);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit + 1);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut agents = rows
            .iter()
            .map(Self::scan_agent)
            .collect::<StorageResult<Vec<_>>>()?;

        let next_cursor = if agents.len() as i64 > limit {
            agents.truncate(limit as usize);
            let last = agents.last().expect("page is non-empty after truncation");
            Some(encode_cursor(last.created_at, &last.id))
        } else {
            None
        };

        Ok((agents, next_cursor))
    }

    /// All agent ids belonging to any of the given teams.
    pub async fn list_ids_by_teams(&self, teams: &[String]) -> StorageResult<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM agents WHERE team = ANY($1)")
            .bind(teams)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(StorageError::from))
            .collect()
    }

    /// Swap in a freshly generated key hash and prefix.
    pub async fn regenerate_key(
        &self,
        id: &str,
        new_hash: &str,
        new_prefix: &str,
    ) -> StorageResult<Agent> {
        let sql = format!(
            "UPDATE agents SET api_key_hash = $1, api_key_prefix = $2 WHERE id = $3 \
             RETURNING {AGENT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(new_hash)
            .bind(new_prefix)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::scan_agent(&row)
    }

    pub async fn update(&self, id: &str, input: UpdateAgentInput) -> StorageResult<Agent> {
        if input.name.is_none() && input.team.is_none() && input.rate_limit.is_none() {
            return self.get_by_id(id).await;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE agents SET ");
        let mut sep = qb.separated(", ");
        if let Some(name) = &input.name {
            sep.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(team) = &input.team {
            sep.push("team = ").push_bind_unseparated(team.clone());
        }
        if let Some(rate_limit) = input.rate_limit {
            sep.push("rate_limit = ").push_bind_unseparated(rate_limit);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {AGENT_COLUMNS}"));

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::scan_agent(&row)
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

fn encode_cursor(created_at: DateTime<Utc>, id: &str) -> String {
    let raw = format!(
        "{}|{}",
        created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        id
    );
    BASE64.encode(raw)
}

fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, String), StorageError> {
    let raw = BASE64
        .decode(cursor)
        .map_err(|_| StorageError::InvalidCursor("not valid base64".into()))?;
    let raw =
        String::from_utf8(raw).map_err(|_| StorageError::InvalidCursor("not valid utf-8".into()))?;
    let (ts, id) = raw
        .split_once('|')
        .ok_or_else(|| StorageError::InvalidCursor("missing separator".into()))?;
    let ts = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| StorageError::InvalidCursor(format!("bad timestamp: {e}")))?
        .with_timezone(&Utc);
    Ok((ts, id.to_string()))
}
