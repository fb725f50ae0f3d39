// ABOUTME: Agent management HTTP handlers
// ABOUTME: Key issuance happens here; the plaintext key is returned exactly once

use crate::audit::audit_log;
use crate::error::ApiError;
use crate::handlers::parse_limit;
use crate::ApiContext;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use octroi_agents::{AgentListParams, CreateAgentInput, SetBudgetInput, UpdateAgentInput};
use octroi_auth::generate_api_key;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub rate_limit: i32,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    #[serde(default)]
    pub daily_limit: f64,
    #[serde(default)]
    pub monthly_limit: f64,
}

/// POST /api/v1/admin/agents — the response carries the plaintext key,
/// which is never retrievable again.
pub async fn create_agent(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CreateAgentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if input.rate_limit < 0 {
        return Err(ApiError::validation("rate_limit must be non-negative"));
    }

    let (key, plaintext) = generate_api_key();
    let agent = ctx
        .agents
        .create(CreateAgentInput {
            name: input.name,
            api_key_hash: key.hash,
            api_key_prefix: key.prefix,
            team: input.team,
            rate_limit: input.rate_limit,
        })
        .await?;

    audit_log("create", "agent", &agent.id);

    let mut view = serde_json::to_value(&agent).map_err(|_| ApiError::internal("serialization"))?;
    view["api_key"] = plaintext.into();
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/admin/agents
pub async fn list_agents(
    State(ctx): State<ApiContext>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_limit(query.limit)?;
    let (agents, next_cursor) = ctx
        .agents
        .list(
            None,
            AgentListParams {
                cursor: query.cursor,
                limit,
            },
        )
        .await?;

    let mut resp = json!({ "agents": agents });
    if let Some(cursor) = next_cursor {
        resp["next_cursor"] = cursor.into();
    }
    Ok(Json(resp))
}

/// PUT /api/v1/admin/agents/{id}
pub async fn update_agent(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateAgentInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if let Some(rate_limit) = input.rate_limit {
        if rate_limit < 0 {
            return Err(ApiError::validation("rate_limit must be non-negative"));
        }
    }
    let agent = ctx.agents.update(&id, input).await?;
    audit_log("update", "agent", &id);
    Ok(Json(agent))
}

/// DELETE /api/v1/admin/agents/{id}
pub async fn delete_agent(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.agents.delete(&id).await?;
    audit_log("delete", "agent", &id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/agents/{id}/regenerate-key — the old key stops
/// working immediately; the new plaintext is returned exactly once.
pub async fn regenerate_key(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (key, plaintext) = generate_api_key();
    let agent = ctx.agents.regenerate_key(&id, &key.hash, &key.prefix).await?;
    audit_log("regenerate-key", "agent", &id);

    let mut view = serde_json::to_value(&agent).map_err(|_| ApiError::internal("serialization"))?;
    view["api_key"] = plaintext.into();
    Ok(Json(view))
}

/// GET /api/v1/agents/me — the calling agent's own record.
pub async fn get_self_agent(
    State(ctx): State<ApiContext>,
    Extension(agent): Extension<octroi_auth::Agent>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = ctx.agents.get_by_id(&agent.id).await?;
    Ok(Json(agent))
}

/// PUT /api/v1/admin/agents/{agent_id}/budgets/{tool_id}
pub async fn set_budget(
    State(ctx): State<ApiContext>,
    Path((agent_id, tool_id)): Path<(String, String)>,
    payload: Result<Json<BudgetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if input.daily_limit < 0.0 || input.monthly_limit < 0.0 {
        return Err(ApiError::validation("budget limits must be non-negative"));
    }

    let budget = ctx
        .budgets
        .set(SetBudgetInput {
            agent_id: agent_id.clone(),
            tool_id: tool_id.clone(),
            daily_limit: input.daily_limit,
            monthly_limit: input.monthly_limit,
        })
        .await?;

    audit_log("set-budget", "agent", &agent_id);
    Ok(Json(budget))
}

/// GET /api/v1/admin/agents/{agent_id}/budgets/{tool_id}
pub async fn get_budget(
    State(ctx): State<ApiContext>,
    Path((agent_id, tool_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let budget = ctx
        .budgets
        .get(&agent_id, &tool_id)
        .await?
        .ok_or_else(|| ApiError::not_found("budget not found"))?;
    Ok(Json(budget))
}

/// GET /api/v1/admin/agents/{agent_id}/budgets
pub async fn list_budgets(
    State(ctx): State<ApiContext>,
    Path(agent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let budgets = ctx.budgets.list_by_agent(&agent_id).await?;
    Ok(Json(json!({ "budgets": budgets })))
}
