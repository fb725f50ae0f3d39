// ABOUTME: Request authentication middlewares
// ABOUTME: Agent API-key auth plus admin and member session auth for axum

use crate::keys::hash_key;
use crate::{AgentLookup, SessionLookup};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Optional counters invoked on auth success and failure, used to feed
/// gateway metrics without coupling this crate to a metrics registry.
#[derive(Clone, Default)]
pub struct AuthHooks {
    pub on_success: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_failure: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl AuthHooks {
    fn success(&self) {
        if let Some(hook) = &self.on_success {
            hook();
        }
    }

    fn failure(&self) {
        if let Some(hook) = &self.on_failure {
            hook();
        }
    }
}

/// State for the agent API-key middleware.
#[derive(Clone)]
pub struct AgentAuthLayer {
    pub agents: Arc<dyn AgentLookup>,
    pub hooks: AuthHooks,
}

impl AgentAuthLayer {
    pub fn new(agents: Arc<dyn AgentLookup>) -> Self {
        Self {
            agents,
            hooks: AuthHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: AuthHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// State for the session middlewares.
#[derive(Clone)]
pub struct SessionLayer {
    pub sessions: Arc<dyn SessionLookup>,
    pub hooks: AuthHooks,
}

impl SessionLayer {
    pub fn new(sessions: Arc<dyn SessionLookup>) -> Self {
        Self {
            sessions,
            hooks: AuthHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: AuthHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
/// The scheme comparison is case-insensitive; an empty token is rejected.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

/// Authenticate the request with an agent API key and inject the agent
/// into request extensions for downstream handlers.
pub async fn agent_auth(
    State(layer): State<AgentAuthLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            layer.hooks.failure();
            return unauthorized("missing or malformed authorization header");
        }
    };

    let hash = hash_key(&token);
    match layer.agents.get_by_key_hash(&hash).await {
        Ok(Some(agent)) => {
            layer.hooks.success();
            req.extensions_mut().insert(agent);
            next.run(req).await
        }
        Ok(None) => {
            layer.hooks.failure();
            unauthorized("invalid api key")
        }
        Err(err) => {
            layer.hooks.failure();
            warn!(error = %err, "agent lookup failed");
            unauthorized("invalid api key")
        }
    }
}

/// Authenticate the request with a session token and require org_admin.
pub async fn admin_session(
    State(layer): State<SessionLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match resolve_session(&layer, req.headers()).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if !user.is_org_admin() {
        layer.hooks.failure();
        return forbidden("admin access required");
    }
    layer.hooks.success();
    req.extensions_mut().insert(user);
    next.run(req).await
}

/// Authenticate the request with a session token; any role is accepted.
pub async fn member_session(
    State(layer): State<SessionLayer>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match resolve_session(&layer, req.headers()).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    layer.hooks.success();
    req.extensions_mut().insert(user);
    next.run(req).await
}

async fn resolve_session(
    layer: &SessionLayer,
    headers: &HeaderMap,
) -> Result<crate::User, Response> {
    let token = match extract_bearer_token(headers) {
        Some(token) => token.to_string(),
        None => {
            layer.hooks.failure();
            return Err(unauthorized("missing or malformed authorization header"));
        }
    };

    match layer.sessions.lookup_session(&token).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            layer.hooks.failure();
            Err(unauthorized("invalid or expired session"))
        }
        Err(err) => {
            layer.hooks.failure();
            warn!(error = %err, "session lookup failed");
            Err(unauthorized("invalid or expired session"))
        }
    }
}

fn unauthorized(message: &str) -> Response {
    envelope(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn forbidden(message: &str) -> Response {
    envelope(StatusCode::FORBIDDEN, "forbidden", message)
}

fn envelope(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Agent, TeamMembership, User};
    use crate::keys::{generate_api_key, hash_key};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use axum::{middleware::from_fn_with_state, routing::get, Extension, Router};
    use http_body_util::BodyExt;
    use octroi_storage::StorageError;
    use tower::ServiceExt;

    struct FakeAgents {
        hash: String,
    }

    #[async_trait]
    impl AgentLookup for FakeAgents {
        async fn get_by_key_hash(&self, hash: &str) -> Result<Option<Agent>, StorageError> {
            if hash == self.hash {
                Ok(Some(Agent {
                    id: "agent-1".into(),
                    name: "test-agent".into(),
                    team: "alpha".into(),
                    rate_limit: 0,
                }))
            } else {
                Ok(None)
            }
        }
    }

    struct FakeSessions {
        token: String,
        role: String,
    }

    #[async_trait]
    impl SessionLookup for FakeSessions {
        async fn lookup_session(&self, token: &str) -> Result<Option<User>, StorageError> {
            if token == self.token {
                Ok(Some(User {
                    id: "u1".into(),
                    email: "u@example.com".into(),
                    name: "u".into(),
                    teams: vec![TeamMembership {
                        team: "alpha".into(),
                        role: "member".into(),
                    }],
                    role: self.role.clone(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    async fn agent_echo(Extension(agent): Extension<Agent>) -> String {
        agent.id
    }

    fn agent_app(hash: String) -> Router {
        let layer = AgentAuthLayer::new(Arc::new(FakeAgents { hash }));
        Router::new()
            .route("/whoami", get(agent_echo))
            .layer(from_fn_with_state(layer, agent_auth))
    }

    fn request(path: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        }
        builder.body(axum::body::Body::empty()).unwrap()
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("tok"));

        headers.insert(header::AUTHORIZATION, "bEaReR tok".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("tok"));

        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized() {
        let app = agent_app("nope".into());
        let resp = app.oneshot(request("/whoami", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn invalid_key_is_unauthorized() {
        let app = agent_app(hash_key("octroi_valid"));
        let resp = app
            .oneshot(request("/whoami", Some("Bearer octroi_wrong")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_key_injects_agent() {
        let (key, plaintext) = generate_api_key();
        let app = agent_app(key.hash);
        let resp = app
            .oneshot(request("/whoami", Some(&format!("Bearer {plaintext}"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"agent-1");
    }

    async fn user_echo(Extension(user): Extension<User>) -> String {
        user.id
    }

    #[tokio::test]
    async fn admin_session_requires_org_admin() {
        let layer = SessionLayer::new(Arc::new(FakeSessions {
            token: "tok".into(),
            role: "member".into(),
        }));
        let app = Router::new()
            .route("/admin", get(user_echo))
            .layer(from_fn_with_state(layer, admin_session));

        let resp = app
            .clone()
            .oneshot(request("/admin", Some("Bearer tok")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(request("/admin", Some("Bearer bad")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn member_session_accepts_any_role() {
        let layer = SessionLayer::new(Arc::new(FakeSessions {
            token: "tok".into(),
            role: "member".into(),
        }));
        let app = Router::new()
            .route("/me", get(user_echo))
            .layer(from_fn_with_state(layer, member_session));

        let resp = app.oneshot(request("/me", Some("Bearer tok"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
