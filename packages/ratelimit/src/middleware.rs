// ABOUTME: Per-agent rate-limit middleware
// ABOUTME: Buckets keyed by agent id with the agent's configured rate override

use crate::limiter::Limiter;
use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use octroi_auth::Agent;
use serde_json::json;
use std::sync::Arc;

/// State for the per-agent rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitLayer {
    pub limiter: Arc<Limiter>,
    pub on_reject: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self {
            limiter,
            on_reject: None,
        }
    }
}

/// Enforce the per-agent rate limit. Expects an authenticated agent in
/// request extensions (set by the agent-auth middleware); requests with no
/// agent pass through untouched. The `X-RateLimit-*` headers are set on
/// every response so callers can inspect their quota.
pub async fn agent_rate_limit(
    State(layer): State<RateLimitLayer>,
    req: Request,
    next: Next,
) -> Response {
    let agent = match req.extensions().get::<Agent>() {
        Some(agent) => agent.clone(),
        None => return next.run(req).await,
    };

    let (limit, remaining, reset_at) = layer.limiter.status(&agent.id, agent.rate_limit);

    if !layer.limiter.allow(&agent.id, agent.rate_limit) {
        if let Some(hook) = &layer.on_reject {
            hook();
        }
        let mut resp = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {
                "code": "rate_limited",
                "message": "Rate limit exceeded. Try again later.",
            }})),
        )
            .into_response();
        set_rate_limit_headers(&mut resp, limit, remaining, reset_at.timestamp());
        return resp;
    }

    let mut resp = next.run(req).await;
    set_rate_limit_headers(&mut resp, limit, remaining, reset_at.timestamp());
    resp
}

fn set_rate_limit_headers(resp: &mut Response, limit: i32, remaining: i32, reset_unix: i64) {
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&reset_unix.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}
