// ABOUTME: Health endpoint backed by a database ping
// ABOUTME: 200 when the pool answers within two seconds, 503 otherwise

use crate::ApiContext;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(2);

/// GET /health
pub async fn health(State(ctx): State<ApiContext>) -> impl IntoResponse {
    let ping = sqlx::query("SELECT 1").execute(&ctx.pool);
    match tokio::time::timeout(PING_TIMEOUT, ping).await {
        Ok(Ok(_)) => (
            StatusCode::OK,
            Json(json!({"status": "ok", "database": "connected"})),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "database": "unreachable"})),
        ),
    }
}
