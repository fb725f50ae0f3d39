// ABOUTME: HTTP surface of the Octroi gateway
// ABOUTME: Router assembly wiring middlewares, handlers, and the proxy pipeline

pub mod audit;
pub mod error;
pub mod handlers;
pub mod login_limit;
pub mod middleware;
pub mod wellknown;

pub use error::ApiError;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{any, delete, get, post, put},
    Router,
};
use login_limit::LoginRateLimiter;
use octroi_agents::{AgentStore, BudgetStore};
use octroi_auth::{
    admin_session, agent_auth, member_session, AgentAuthLayer, AgentLookup, SessionLayer,
    SessionLookup,
};
use octroi_metering::MeterStore;
use octroi_proxy::{proxy_request, ProxyHandler};
use octroi_ratelimit::{agent_rate_limit, Limiter, RateLimitLayer, ToolRateLimitStore};
use octroi_registry::ToolService;
use octroi_users::UserStore;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Shared state handed to every API handler.
#[derive(Clone)]
pub struct ApiContext {
    pub pool: PgPool,
    pub tools: Arc<ToolService>,
    pub agents: AgentStore,
    pub budgets: BudgetStore,
    pub meter: MeterStore,
    pub users: UserStore,
    pub tool_rate_limits: ToolRateLimitStore,
    pub login_limiter: Arc<LoginRateLimiter>,
}

/// Everything the router needs, built once at boot.
pub struct RouterDeps {
    pub pool: PgPool,
    pub tools: Arc<ToolService>,
    pub agents: AgentStore,
    pub budgets: BudgetStore,
    pub meter: MeterStore,
    pub users: UserStore,
    pub tool_rate_limits: ToolRateLimitStore,
    pub limiter: Arc<Limiter>,
    pub proxy: Arc<ProxyHandler>,
    pub allowed_origins: Vec<String>,
}

/// Build the full application router: public reads, session-authed user
/// routes, admin CRUD, agent-key routes, and the proxy itself.
pub fn build_router(deps: RouterDeps) -> Router {
    // Login attempts: 5 per IP per minute, cleaned up periodically.
    let login_limiter = Arc::new(LoginRateLimiter::new(5, Duration::from_secs(60)));
    {
        let limiter = login_limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                limiter.cleanup();
            }
        });
    }

    let ctx = ApiContext {
        pool: deps.pool,
        tools: deps.tools,
        agents: deps.agents.clone(),
        budgets: deps.budgets,
        meter: deps.meter,
        users: deps.users.clone(),
        tool_rate_limits: deps.tool_rate_limits,
        login_limiter,
    };

    let agent_lookup: Arc<dyn AgentLookup> = Arc::new(deps.agents);
    let session_lookup: Arc<dyn SessionLookup> = Arc::new(deps.users);
    let agent_auth_layer = AgentAuthLayer::new(agent_lookup);
    let session_layer = SessionLayer::new(session_lookup);
    let rate_layer = RateLimitLayer::new(deps.limiter);

    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/.well-known/octroi.json", get(wellknown::well_known))
        .route("/api/v1/tools", get(handlers::tools::list_tools))
        .route("/api/v1/tools/search", get(handlers::tools::search_tools))
        .route("/api/v1/tools/{id}", get(handlers::tools::get_tool))
        .route(
            "/api/v1/auth/login",
            post(handlers::auth::login)
                .layer(from_fn_with_state(ctx.clone(), handlers::auth::login_rate_limit)),
        );

    let session_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .layer(from_fn_with_state(session_layer.clone(), member_session));

    let admin = Router::new()
        .route(
            "/tools",
            get(handlers::tools::admin_list_tools).post(handlers::tools::create_tool),
        )
        .route(
            "/tools/{id}",
            put(handlers::tools::update_tool).delete(handlers::tools::delete_tool),
        )
        .route(
            "/tools/{id}/rate-limits",
            get(handlers::tool_rate_limits::list_overrides)
                .put(handlers::tool_rate_limits::set_override),
        )
        .route(
            "/tools/{id}/rate-limits/{scope}/{scope_id}",
            delete(handlers::tool_rate_limits::delete_override),
        )
        .route(
            "/agents",
            post(handlers::agents::create_agent).get(handlers::agents::list_agents),
        )
        .route(
            "/agents/{id}",
            put(handlers::agents::update_agent).delete(handlers::agents::delete_agent),
        )
        .route(
            "/agents/{id}/regenerate-key",
            post(handlers::agents::regenerate_key),
        )
        .route("/agents/{id}/budgets", get(handlers::agents::list_budgets))
        .route(
            "/agents/{id}/budgets/{tool_id}",
            put(handlers::agents::set_budget).get(handlers::agents::get_budget),
        )
        .route("/usage", get(handlers::usage::admin_usage))
        .route(
            "/usage/transactions",
            get(handlers::usage::admin_transactions),
        )
        .route("/usage/tools/calls", get(handlers::usage::tool_call_counts))
        .route(
            "/usage/tools/{tool_id}",
            get(handlers::usage::usage_by_tool),
        )
        .route(
            "/usage/agents/{agent_id}",
            get(handlers::usage::usage_by_agent),
        )
        .route(
            "/usage/agents/{agent_id}/tools/{tool_id}",
            get(handlers::usage::usage_by_agent_tool),
        )
        .route(
            "/users",
            post(handlers::users::create_user).get(handlers::users::list_users),
        )
        .route(
            "/users/{id}",
            put(handlers::users::update_user).delete(handlers::users::delete_user),
        )
        .layer(from_fn_with_state(session_layer, admin_session));

    let agent_routes = Router::new()
        .route("/api/v1/agents/me", get(handlers::agents::get_self_agent))
        .route("/api/v1/usage", get(handlers::usage::agent_usage))
        .route(
            "/api/v1/usage/transactions",
            get(handlers::usage::agent_transactions),
        )
        .layer(from_fn_with_state(rate_layer.clone(), agent_rate_limit))
        .layer(from_fn_with_state(agent_auth_layer.clone(), agent_auth));

    let proxy_routes = Router::new()
        .route("/proxy/{tool_id}", any(proxy_request))
        .route("/proxy/{tool_id}/{*path}", any(proxy_request))
        .with_state(deps.proxy)
        .layer(from_fn_with_state(rate_layer, agent_rate_limit))
        .layer(from_fn_with_state(agent_auth_layer, agent_auth));

    let api = public
        .merge(session_routes)
        .merge(agent_routes)
        .nest("/api/v1/admin", admin)
        .with_state(ctx);

    let mut app = api.merge(proxy_routes);
    if let Some(cors) = middleware::cors_layer(&deps.allowed_origins) {
        app = app.layer(cors);
    }
    app.layer(from_fn(middleware::request_logger))
        .layer(from_fn(middleware::request_id))
        .layer(from_fn(middleware::secure_headers))
}
