// ABOUTME: Postgres-backed store for the transaction log
// ABOUTME: Multi-row batch inserts plus usage aggregation and listing

use crate::collector::BatchInsert;
use crate::types::{Transaction, UsageQuery, UsageSummary};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use octroi_storage::{StorageError, StorageResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct MeterStore {
    pool: PgPool,
}

impl MeterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate usage metrics matching the query filters.
    pub async fn get_summary(&self, query: &UsageQuery) -> StorageResult<UsageSummary> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT \
                COUNT(*) AS total_requests, \
                COALESCE(SUM(cost), 0)::float8 AS total_cost, \
                COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0) AS success_count, \
                COALESCE(SUM(CASE WHEN NOT success THEN 1 ELSE 0 END), 0) AS error_count, \
                COALESCE(AVG(latency_ms), 0)::float8 AS avg_latency_ms \
             FROM transactions",
        );
        push_filters(&mut qb, query);

        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(UsageSummary {
            total_requests: row.try_get("total_requests")?,
            total_cost: row.try_get("total_cost")?,
            success_count: row.try_get("success_count")?,
            error_count: row.try_get("error_count")?,
            avg_latency_ms: row.try_get("avg_latency_ms")?,
        })
    }

    /// Total transaction count per tool across all tools.
    pub async fn get_tool_call_counts(
        &self,
    ) -> StorageResult<std::collections::HashMap<String, i64>> {
        let rows =
            sqlx::query("SELECT tool_id, COUNT(*) AS calls FROM transactions GROUP BY tool_id")
                .fetch_all(&self.pool)
                .await?;
        let mut counts = std::collections::HashMap::new();
        for row in rows {
            counts.insert(row.try_get("tool_id")?, row.try_get("calls")?);
        }
        Ok(counts)
    }

    /// Page of transactions matching the filters, ordered by
    /// `timestamp DESC, id DESC` with cursor-based pagination.
    pub async fn list_transactions(
        &self,
        query: &UsageQuery,
    ) -> StorageResult<(Vec<Transaction>, Option<String>)> {
        let limit = if query.limit > 0 {
            query.limit
        } else {
            DEFAULT_LIMIT
        };

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, agent_id, tool_id, timestamp, method, path, status_code, latency_ms, \
             request_size, response_size, success, cost::float8 AS cost, cost_source, error \
             FROM transactions",
        );
        let has_where = push_filters(&mut qb, query);

        if let Some(cursor) = query.cursor.as_deref() {
            let (ts, id) = decode_cursor(cursor)?;
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push("(timestamp, id) < (");
            qb.push_bind(ts);
            qb.push(", ");
            qb.push_bind(id);
            qb.push(")");
        }

        qb.push(" ORDER BY timestamp DESC, id DESC LIMIT ");
        qb.push_bind(limit + 1);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut txns = rows
            .iter()
            .map(scan_transaction)
            .collect::<StorageResult<Vec<_>>>()?;

        let next_cursor = if txns.len() as i64 > limit {
            txns.truncate(limit as usize);
            let last = txns.last().expect("page is non-empty after truncation");
            Some(encode_cursor(last.timestamp, &last.id))
        } else {
            None
        };

        Ok((txns, next_cursor))
    }
}

#[async_trait]
impl BatchInsert for MeterStore {
    /// Write a batch in a single multi-row INSERT. No-op for empty batches.
    async fn batch_insert(&self, txns: Vec<Transaction>) -> Result<(), StorageError> {
        if txns.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO transactions \
             (id, agent_id, tool_id, timestamp, method, path, status_code, latency_ms, \
              request_size, response_size, success, cost, cost_source, error) ",
        );
        qb.push_values(txns, |mut row, tx| {
            let id = if tx.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                tx.id
            };
            let cost_source = if tx.cost_source.is_empty() {
                "flat".to_string()
            } else {
                tx.cost_source
            };
            row.push_bind(id)
                .push_bind(tx.agent_id)
                .push_bind(tx.tool_id)
                .push_bind(tx.timestamp)
                .push_bind(tx.method)
                .push_bind(tx.path)
                .push_bind(tx.status_code)
                .push_bind(tx.latency_ms)
                .push_bind(tx.request_size)
                .push_bind(tx.response_size)
                .push_bind(tx.success)
                .push_bind(tx.cost)
                .push_bind(cost_source)
                .push_bind(tx.error);
        });

        qb.build().execute(&self.pool).await?;
        Ok(())
    }
}

fn scan_transaction(row: &PgRow) -> StorageResult<Transaction> {
    Ok(Transaction {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        tool_id: row.try_get("tool_id")?,
        timestamp: row.try_get("timestamp")?,
        method: row.try_get("method")?,
        path: row.try_get("path")?,
        status_code: row.try_get("status_code")?,
        latency_ms: row.try_get("latency_ms")?,
        request_size: row.try_get("request_size")?,
        response_size: row.try_get("response_size")?,
        success: row.try_get("success")?,
        cost: row.try_get("cost")?,
        cost_source: row.try_get("cost_source")?,
        error: row.try_get("error")?,
    })
}

/// Append filter conditions from the query. Returns whether a WHERE clause
/// was started.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UsageQuery) -> bool {
    let mut has_where = false;
    let mut push_clause = |qb: &mut QueryBuilder<'_, Postgres>| {
        if has_where {
            qb.push(" AND ");
        } else {
            qb.push(" WHERE ");
            has_where = true;
        }
    };

    if let Some(agent_id) = &query.agent_id {
        push_clause(qb);
        qb.push("agent_id = ");
        qb.push_bind(agent_id.clone());
    } else if !query.agent_ids.is_empty() {
        push_clause(qb);
        qb.push("agent_id = ANY(");
        qb.push_bind(query.agent_ids.clone());
        qb.push(")");
    }

    if let Some(tool_id) = &query.tool_id {
        push_clause(qb);
        qb.push("tool_id = ");
        qb.push_bind(tool_id.clone());
    } else if !query.tool_ids.is_empty() {
        push_clause(qb);
        qb.push("tool_id = ANY(");
        qb.push_bind(query.tool_ids.clone());
        qb.push(")");
    }

    if let Some(from) = query.from {
        push_clause(qb);
        qb.push("timestamp >= ");
        qb.push_bind(from);
    }
    if let Some(to) = query.to {
        push_clause(qb);
        qb.push("timestamp <= ");
        qb.push_bind(to);
    }

    has_where
}

fn encode_cursor(ts: DateTime<Utc>, id: &str) -> String {
    let raw = format!("{}|{}", ts.to_rfc3339_opts(SecondsFormat::Nanos, true), id);
    URL_SAFE_NO_PAD.encode(raw)
}

fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, String), StorageError> {
    let raw = URL_SAFE_NO_PAD
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
