// ABOUTME: Static discovery manifest for the gateway
// ABOUTME: Served at /.well-known/octroi.json

use axum::http::header;
use axum::response::IntoResponse;

const MANIFEST: &str = r#"{
  "name": "Octroi",
  "description": "API gateway for AI agent tool access",
  "version": "0.1.0",
  "api_base": "/api/v1",
  "auth": {
    "type": "bearer",
    "header": "Authorization"
  },
  "endpoints": {
    "tools": "/api/v1/tools",
    "tools_search": "/api/v1/tools/search",
    "agents": "/api/v1/agents",
    "usage": "/api/v1/usage",
    "proxy": "/proxy/{toolID}/"
  },
  "health": "/health"
}"#;

pub async fn well_known() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], MANIFEST)
}
