// ABOUTME: User administration HTTP handlers
// ABOUTME: Admin-only CRUD over user accounts

use crate::audit::audit_log;
use crate::error::ApiError;
use crate::ApiContext;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use octroi_users::{CreateUserInput, UpdateUserInput};
use serde_json::json;

const VALID_ROLES: &[&str] = &["org_admin", "member"];

/// POST /api/v1/admin/users
pub async fn create_user(
    State(ctx): State<ApiContext>,
    payload: Result<Json<CreateUserInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if input.email.trim().is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if input.password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if !input.role.is_empty() && !VALID_ROLES.contains(&input.role.as_str()) {
        return Err(ApiError::validation(
            "role must be one of: org_admin, member",
        ));
    }

    let user = ctx.users.create(input).await?;
    audit_log("create", "user", &user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/admin/users
pub async fn list_users(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    let users = ctx.users.list().await?;
    Ok(Json(json!({ "users": users })))
}

/// PUT /api/v1/admin/users/{id}
pub async fn update_user(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;
    if let Some(role) = &input.role {
        if !VALID_ROLES.contains(&role.as_str()) {
            return Err(ApiError::validation(
                "role must be one of: org_admin, member",
            ));
        }
    }
    let user = ctx.users.update(&id, input).await?;
    audit_log("update", "user", &id);
    Ok(Json(user))
}

/// DELETE /api/v1/admin/users/{id}
pub async fn delete_user(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.users.delete(&id).await?;
    audit_log("delete", "user", &id);
    Ok(StatusCode::NO_CONTENT)
}
