// ABOUTME: Tool registry HTTP handlers
// ABOUTME: Public read views plus admin CRUD with full credential visibility

use crate::audit::audit_log;
use crate::error::ApiError;
use crate::handlers::parse_limit;
use crate::ApiContext;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use octroi_registry::{CreateToolInput, ToolListParams, UpdateToolInput};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub q: Option<String>,
}

/// POST /api/v1/admin/tools
pub async fn create_tool(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CreateToolInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    let tool = ctx.tools.create(input).await?;
    audit_log("create", "tool", &tool.id);
    Ok((StatusCode::CREATED, Json(tool.admin_view())))
}

/// PUT /api/v1/admin/tools/{id}
pub async fn update_tool(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateToolInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    let tool = ctx.tools.update(&id, input).await?;
    audit_log("update", "tool", &id);
    Ok(Json(tool.admin_view()))
}

/// DELETE /api/v1/admin/tools/{id}
pub async fn delete_tool(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.tools.delete(&id).await?;
    audit_log("delete", "tool", &id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/tools — public view without endpoint or credentials.
pub async fn list_tools(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit)?;
    let (tools, next_cursor) = ctx
        .tools
        .list(ToolListParams {
            cursor: query.cursor,
            limit,
            query: query.q,
        })
        .await?;

    let mut resp = json!({ "tools": tools });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}

/// GET /api/v1/tools/{id} — public view.
pub async fn get_tool(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tool = ctx.tools.get_by_id(&id).await.map_err(|err| {
        if err.is_not_found() {
            ApiError::not_found("tool not found")
        } else {
            err.into()
        }
    })?;
    Ok(Json(tool))
}

/// GET /api/v1/tools/search — text search over name and description.
pub async fn search_tools(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit)?;
    let q = query.q.unwrap_or_default();
    let (tools, next_cursor) = ctx.tools.search(&q, limit, query.cursor).await?;

    let mut resp = json!({ "tools": tools });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}

/// GET /api/v1/admin/tools — full views including credentials.
pub async fn admin_list_tools(
    State(ctx): State<ApiContext>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit)?;
    let (tools, next_cursor) = ctx
        .tools
        .list(ToolListParams {
            cursor: query.cursor,
            limit,
            query: query.q,
        })
        .await?;

    let views: Vec<_> = tools.iter().map(|t| t.admin_view()).collect();
    let mut resp = json!({ "tools": views });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}
