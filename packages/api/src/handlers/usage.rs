// ABOUTME: Usage reporting HTTP handlers
// ABOUTME: Agent-scoped and admin-scoped reads over the transaction log

use crate::error::ApiError;
use crate::handlers::parse_limit;
use crate::ApiContext;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use octroi_metering::UsageQuery;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct UsageParams {
    pub agent_id: Option<String>,
    pub tool_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

impl UsageParams {
    fn into_query(self) -> Result<UsageQuery, ApiError> {
        Ok(UsageQuery {
            agent_id: self.agent_id,
            agent_ids: Vec::new(),
            tool_id: self.tool_id,
            tool_ids: Vec::new(),
            from: parse_time(self.from.as_deref())?,
            to: parse_time(self.to.as_deref())?,
            cursor: self.cursor,
            limit: parse_limit(self.limit)?,
        })
    }
}

fn parse_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| ApiError::invalid_params("timestamps must be RFC3339")),
    }
}

/// GET /api/v1/usage — the calling agent's own usage summary.
pub async fn agent_usage(
    State(ctx): State<ApiContext>,
    Extension(agent): Extension<octroi_auth::Agent>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = params.into_query()?;
    query.agent_id = Some(agent.id);
    let summary = ctx.meter.get_summary(&query).await?;
    Ok(Json(summary))
}

/// GET /api/v1/usage/transactions — the calling agent's transactions.
pub async fn agent_transactions(
    State(ctx): State<ApiContext>,
    Extension(agent): Extension<octroi_auth::Agent>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = params.into_query()?;
    query.agent_id = Some(agent.id);
    let (transactions, next_cursor) = ctx.meter.list_transactions(&query).await?;

    let mut resp = json!({ "transactions": transactions });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}

/// GET /api/v1/admin/usage — summary with arbitrary filters.
pub async fn admin_usage(
    State(ctx): State<ApiContext>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query()?;
    let summary = ctx.meter.get_summary(&query).await?;
    Ok(Json(summary))
}

/// GET /api/v1/admin/usage/transactions — listing with arbitrary filters.
pub async fn admin_transactions(
    State(ctx): State<ApiContext>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query()?;
    let (transactions, next_cursor) = ctx.meter.list_transactions(&query).await?;

    let mut resp = json!({ "transactions": transactions });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}

/// GET /api/v1/admin/usage/agents/{agent_id}
pub async fn usage_by_agent(
    State(ctx): State<ApiContext>,
    Path(agent_id): Path<String>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = params.into_query()?;
    query.agent_id = Some(agent_id);
    let summary = ctx.meter.get_summary(&query).await?;
    Ok(Json(summary))
}

/// GET /api/v1/admin/usage/tools/{tool_id}
pub async fn usage_by_tool(
    State(ctx): State<ApiContext>,
    Path(tool_id): Path<String>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = params.into_query()?;
    query.tool_id = Some(tool_id);
    let summary = ctx.meter.get_summary(&query).await?;
    Ok(Json(summary))
}

/// GET /api/v1/admin/usage/agents/{agent_id}/tools/{tool_id}
pub async fn usage_by_agent_tool(
    State(ctx): State<ApiContext>,
    Path((agent_id, tool_id)): Path<(String, String)>,
    Query(params): Query<UsageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = params.into_query()?;
    query.agent_id = Some(agent_id);
    query.tool_id = Some(tool_id);
    let summary = ctx.meter.get_summary(&query).await?;
    Ok(Json(summary))
}

/// GET /api/v1/admin/usage/tools/calls — transaction counts per tool.
pub async fn tool_call_counts(
    State(ctx): State<ApiContext>,
) -> Result<impl IntoResponse, ApiError> {
    let counts = ctx.meter.get_tool_call_counts().await?;
    Ok(Json(json!({ "counts": counts })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing_accepts_rfc3339_only() {
        assert!(parse_time(None).unwrap().is_none());
        assert!(parse_time(Some("2025-06-01T00:00:00Z")).unwrap().is_some());
        assert!(parse_time(Some("yesterday")).is_err());
    }
}
