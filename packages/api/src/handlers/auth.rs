// ABOUTME: Login, session introspection, and logout handlers
// ABOUTME: Login is rate limited per IP; session tokens are returned once

use crate::error::ApiError;
use crate::ApiContext;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use octroi_auth::extract_bearer_token;
use octroi_users::UserStore;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Per-IP limiter applied to the login route only. The client IP comes
/// from X-Forwarded-For when present, else the socket address.
pub async fn login_rate_limit(
    State(ctx): State<ApiContext>,
    req: Request,
    next: Next,
) -> Response {
    let ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let (allowed, retry_after) = ctx.login_limiter.allow(&ip);
    if !allowed {
        warn!(ip = %ip, audit = true, "login rate limit exceeded");
        let mut resp = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {
                "code": "rate_limited",
                "message": "too many login attempts, try again later",
            }})),
        )
            .into_response();
        if let Ok(value) = retry_after.to_string().parse() {
            resp.headers_mut().insert("Retry-After", value);
        }
        return resp;
    }
    next.run(req).await
}

/// POST /api/v1/auth/login
pub async fn login(
    State(ctx): State<ApiContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|_| ApiError::invalid_body())?;

    let user = ctx
        .users
        .get_by_email(&input.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;

    if !UserStore::check_password(&user, &input.password) {
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    let (token, session) = ctx.users.create_session(&user.id).await?;
    Ok(Json(json!({
        "token": token,
        "expires_at": session.expires_at,
        "user": user,
    })))
}

/// GET /api/v1/auth/me
pub async fn me(Extension(user): Extension<octroi_auth::User>) -> impl IntoResponse {
    Json(user)
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(ctx): State<ApiContext>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("missing or malformed authorization header"))?
        .to_string();
    ctx.users.delete_session(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}
