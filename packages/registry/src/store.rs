// ABOUTME: Postgres-backed store for the tool registry
// ABOUTME: CRUD with cursor pagination and encrypted credential columns

use crate::crypto::Cipher;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::types::{CreateToolInput, Tool, ToolListParams, UpdateToolInput};
use octroi_storage::{StorageError, StorageResult};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_LIMIT: i64 = 20;

/// Columns selected for every tool read. Monetary columns are stored as
/// numeric(12,6) and cast to float8 at the boundary.
const TOOL_COLUMNS: &str = "id, name, description, mode, endpoint, auth_type, auth_config, \
     variables, pricing_model, pricing_amount::float8 AS pricing_amount, pricing_currency, \
     rate_limit, budget_limit::float8 AS budget_limit, budget_window, created_at, updated_at";

/// Database operations for tool registry management. An optional cipher
/// encrypts `auth_config` at rest; `None` stores it as plain JSON.
#[derive(Clone)]
pub struct ToolStore {
    pool: PgPool,
    cipher: Option<Arc<dyn Cipher>>,
}

impl ToolStore {
    pub fn new(pool: PgPool, cipher: Option<Arc<dyn Cipher>>) -> Self {
        Self { pool, cipher }
    }

    fn seal_auth_config(&self, auth_config: &HashMap<String, String>) -> StorageResult<String> {
        let json = serde_json::to_string(auth_config)?;
        match &self.cipher {
            Some(cipher) => cipher
                .encrypt(&json)
                .map_err(|e| StorageError::Other(format!("encrypting auth_config: {e}"))),
            None => Ok(json),
        }
    }

    fn scan_tool(&self, row: &PgRow) -> StorageResult<Tool> {
        let auth_config_raw: String = row.try_get("auth_config")?;
        let auth_config = self.open_auth_config(&auth_config_raw)?;

        let variables: HashMap<String, String> = row
            .try_get::<Option<serde_json::Value>, _>("variables")?
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        Ok(Tool {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            mode: row.try_get("mode")?,
            endpoint: row.try_get("endpoint")?,
            auth_type: row.try_get("auth_type")?,
            auth_config,
            variables,
            pricing_model: row.try_get("pricing_model")?,
            pricing_amount: row.try_get("pricing_amount")?,
            pricing_currency: row.try_get("pricing_currency")?,
            rate_limit: row.try_get("rate_limit")?,
            budget_limit: row.try_get("budget_limit")?,
            budget_window: row.try_get("budget_window")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Decrypt stored credential material. Rows written before encryption
    /// was enabled hold plain JSON, so a failed decrypt falls back to
    /// reading the stored value as-is.
    fn open_auth_config(&self, stored: &str) -> StorageResult<HashMap<String, String>> {
        if stored.is_empty() {
            return Ok(HashMap::new());
        }
        let json = match &self.cipher {
            Some(cipher) => cipher
                .decrypt(stored)
                .unwrap_or_else(|_| stored.to_string()),
            None => stored.to_string(),
        };
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn create(&self, input: CreateToolInput) -> StorageResult<Tool> {
        let id = Uuid::new_v4().to_string();
        let auth_config = self.seal_auth_config(&input.auth_config)?;
        let variables = serde_json::to_value(&input.variables)?;

        let sql = format!(
            "INSERT INTO tools \
             (id, name, description, mode, endpoint, auth_type, auth_config, variables, \
              pricing_model, pricing_amount, pricing_currency, rate_limit, budget_limit, budget_window) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {TOOL_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.mode)
            .bind(&input.endpoint)
            .bind(&input.auth_type)
            .bind(&auth_config)
            .bind(&variables)
            .bind(&input.pricing_model)
            .bind(input.pricing_amount)
            .bind(&input.pricing_currency)
            .bind(input.rate_limit)
            .bind(input.budget_limit)
            .bind(&input.budget_window)
            .fetch_one(&self.pool)
            .await?;
        self.scan_tool(&row)
    }

    pub async fn get_by_id(&self, id: &str) -> StorageResult<Tool> {
        let sql = format!("SELECT {TOOL_COLUMNS} FROM tools WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        self.scan_tool(&row)
    }

    /// Page of tools ordered by `created_at DESC, id DESC` with opaque
    /// cursor pagination. An optional query filters name/description.
    pub async fn list(
        &self,
        params: ToolListParams,
    ) -> StorageResult<(Vec<Tool>, Option<String>)> {
        let limit = if params.limit > 0 {
            params.limit
        } else {
            DEFAULT_LIMIT
        };

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TOOL_COLUMNS} FROM tools"));
        let mut has_where = false;

        if let Some(cursor) = params.cursor.as_deref() {
            let (cursor_time, cursor_id) = decode_cursor(cursor)?;
            qb.push(" WHERE (created_at, id) < (");
            qb.push_bind(cursor_time);
            qb.push(", ");
            qb.push_bind(cursor_id);
            qb.push(")");
            has_where = true;
        }

        if let Some(query) = params.query.as_deref().filter(|q| !q.is_empty()) {
            qb.push(if has_where { " AND " } else { " WHERE " });
            let pattern = format!("%{query}%");
            qb.push("(name ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR description ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(limit + 1); // one extra row to detect the next page

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut tools = rows
            .iter()
            .map(|row| self.scan_tool(row))
            .collect::<StorageResult<Vec<_>>>()?;

        let next_cursor = if tools.len() as i64 > limit {
            tools.truncate(limit as usize);
            let last = tools.last().expect("page is non-empty after truncation");
            Some(encode_cursor(last.created_at, &last.id))
        } else {
            None
        };

        Ok((tools, next_cursor))
    }

    pub async fn update(&self, id: &str, input: UpdateToolInput) -> StorageResult<Tool> {
        if input.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tools SET ");
        let mut sep = qb.separated(", ");

        if let Some(name) = &input.name {
            sep.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(description) = &input.description {
            sep.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        if let Some(mode) = &input.mode {
            sep.push("mode = ").push_bind_unseparated(mode.clone());
        }
        if let Some(endpoint) = &input.endpoint {
            sep.push("endpoint = ")
                .push_bind_unseparated(endpoint.clone());
        }
        if let Some(auth_type) = &input.auth_type {
            sep.push("auth_type = ")
                .push_bind_unseparated(auth_type.clone());
        }
        if let Some(auth_config) = &input.auth_config {
            let sealed = self.seal_auth_config(auth_config)?;
            sep.push("auth_config = ").push_bind_unseparated(sealed);
        }
        if let Some(variables) = &input.variables {
            let json = serde_json::to_value(variables)?;
            sep.push("variables = ").push_bind_unseparated(json);
        }
        if let Some(pricing_model) = &input.pricing_model {
            sep.push("pricing_model = ")
                .push_bind_unseparated(pricing_model.clone());
        }
        if let Some(pricing_amount) = input.pricing_amount {
            sep.push("pricing_amount = ")
                .push_bind_unseparated(pricing_amount);
        }
        if let Some(pricing_currency) = &input.pricing_currency {
            sep.push("pricing_currency = ")
                .push_bind_unseparated(pricing_currency.clone());
        }
        if let Some(rate_limit) = input.rate_limit {
            sep.push("rate_limit = ").push_bind_unseparated(rate_limit);
        }
        if let Some(budget_limit) = input.budget_limit {
            sep.push("budget_limit = ")
                .push_bind_unseparated(budget_limit);
        }
        if let Some(budget_window) = &input.budget_window {
            sep.push("budget_window = ")
                .push_bind_unseparated(budget_window.clone());
        }
        sep.push("updated_at = now()");

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {TOOL_COLUMNS}"));

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        self.scan_tool(&row)
    }

    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM tools WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
