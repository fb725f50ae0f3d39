// ABOUTME: Tool rate-limit override HTTP handlers
// ABOUTME: Admin CRUD for team- and agent-scoped per-tool rates

use crate::audit::audit_log;
use crate::error::ApiError;
use crate::ApiContext;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

const VALID_SCOPES: &[&str] = &["team", "agent"];

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub scope: String,
    pub scope_id: String,
    pub rate_limit: i32,
}

/// GET /api/v1/admin/tools/{tool_id}/rate-limits
pub async fn list_overrides(
    State(ctx): State<ApiContext>,
    Path(tool_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let overrides = ctx.tool_rate_limits.list_by_tool(&tool_id).await?;
    Ok(Json(json!({ "rate_limits": overrides })))
}

/// PUT /api/v1/admin/tools/{tool_id}/rate-limits
pub async fn set_override(
    State(ctx): State<ApiContext>,
    Path(tool_id): Path<String>,
    payload: Result<Json<SetOverrideRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if !VALID_SCOPES.contains(&input.scope.as_str()) {
        return Err(ApiError::validation("scope must be one of: team, agent"));
    }
    if input.scope_id.trim().is_empty() {
        return Err(ApiError::validation("scope_id is required"));
    }
    if input.rate_limit <= 0 {
        return Err(ApiError::validation("rate_limit must be positive"));
    }

    // The override references the tool by id; reject unknown tools up front.
    ctx.tools
        .get_by_id(&tool_id)
        .await
        .map_err(|_| ApiError::not_found("tool not found"))?;

    ctx.tool_rate_limits
        .set(&tool_id, &input.scope, &input.scope_id, input.rate_limit)
        .await?;

    audit_log("set-rate-limit", "tool", &tool_id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/admin/tools/{tool_id}/rate-limits/{scope}/{scope_id}
pub async fn delete_override(
    State(ctx): State<ApiContext>,
    Path((tool_id, scope, scope_id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.tool_rate_limits
        .delete(&tool_id, &scope, &scope_id)
        .await?;
    audit_log("delete-rate-limit", "tool", &tool_id);
    Ok(StatusCode::NO_CONTENT)
}
