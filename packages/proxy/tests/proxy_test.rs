// ABOUTME: End-to-end proxy tests against a live in-process upstream
// ABOUTME: Fake stores isolate the pipeline; a real axum listener plays upstream

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request as AxumRequest,
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::any,
    Extension, Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use octroi_agents::{BudgetDecision, GlobalBudgetDecision};
use octroi_auth::Agent;
use octroi_metering::Transaction;
use octroi_proxy::{
    proxy_request, BudgetSource, ProxyHandler, ToolRateLimitSource, ToolSource, TransactionSink,
};
use octroi_ratelimit::{Limiter, RateResolver, ToolRateDecision, ToolRateLimiter};
use octroi_registry::Tool;
use octroi_storage::StorageError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

// --- Fakes ---

struct FakeTools {
    tools: HashMap<String, Tool>,
}

#[async_trait]
impl ToolSource for FakeTools {
    async fn get_by_id(&self, id: &str) -> Result<Tool, StorageError> {
        self.tools.get(id).cloned().ok_or(StorageError::NotFound)
    }
}

struct FakeBudgets {
    agent_allowed: bool,
    global_allowed: bool,
}

#[async_trait]
impl BudgetSource for FakeBudgets {
    async fn check_budget(&self, _: &str, _: &str) -> Result<BudgetDecision, StorageError> {
        Ok(BudgetDecision {
            allowed: self.agent_allowed,
            remaining_daily: 100.0,
            remaining_monthly: 1000.0,
        })
    }

    async fn check_tool_global_budget(
        &self,
        _: &str,
    ) -> Result<GlobalBudgetDecision, StorageError> {
        Ok(GlobalBudgetDecision {
            allowed: self.global_allowed,
            remaining: 500.0,
        })
    }
}

#[derive(Default)]
struct FakeSink {
    transactions: Mutex<Vec<Transaction>>,
}

impl TransactionSink for FakeSink {
    fn record(&self, tx: Transaction) {
        self.transactions.lock().unwrap().push(tx);
    }
}

struct FixedRates {
    global: i32,
    team: i32,
    agent: i32,
}

#[async_trait]
impl RateResolver for FixedRates {
    async fn resolve(&self, _: &str, _: &str, _: &str) -> Result<(i32, i32, i32), StorageError> {
        Ok((self.global, self.team, self.agent))
    }
}

// --- Helpers ---

fn test_agent() -> Agent {
    Agent {
        id: "agent-1".into(),
        name: "test-agent".into(),
        team: "alpha".into(),
        rate_limit: 0,
    }
}

fn test_tool(endpoint: &str) -> Tool {
    Tool {
        id: "tool-1".into(),
        name: "test-tool".into(),
        description: "a test tool".into(),
        mode: "service".into(),
        endpoint: endpoint.into(),
        auth_type: "none".into(),
        auth_config: HashMap::new(),
        variables: HashMap::new(),
        pricing_model: "per_request".into(),
        pricing_amount: 0.01,
        pricing_currency: "USD".into(),
        rate_limit: 0,
        budget_limit: 0.0,
        budget_window: "monthly".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

struct Pipeline {
    router: Router,
    sink: Arc<FakeSink>,
}

fn pipeline(tool: Tool) -> Pipeline {
    pipeline_with(tool, true, true, None)
}

fn pipeline_with(
    tool: Tool,
    agent_allowed: bool,
    global_allowed: bool,
    tool_rates: Option<Arc<dyn ToolRateLimitSource>>,
) -> Pipeline {
    let sink = Arc::new(FakeSink::default());
    let tools = Arc::new(FakeTools {
        tools: HashMap::from([(tool.id.clone(), tool)]),
    });
    let budgets = Arc::new(FakeBudgets {
        agent_allowed,
        global_allowed,
    });

    let mut handler = ProxyHandler::new(
        tools,
        budgets,
        sink.clone(),
        Duration::from_secs(5),
        1 << 20,
    );
    if let Some(rates) = tool_rates {
        handler = handler.with_tool_rate_limits(rates);
    }

    let router = Router::new()
        .route("/proxy/{tool_id}", any(proxy_request))
        .route("/proxy/{tool_id}/{*path}", any(proxy_request))
        .with_state(Arc::new(handler))
        .layer(Extension(test_agent()));

    Pipeline { router, sink }
}

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Tests ---

#[tokio::test]
async fn forwards_request_and_records_transaction() {
    let upstream = spawn_upstream(Router::new().route(
        "/api/data",
        any(|req: AxumRequest| async move {
            assert_eq!(req.uri().query(), Some("x=1"));
            assert_eq!(req.headers().get("X-Custom").unwrap(), "v");
            assert!(
                req.headers().get(header::AUTHORIZATION).is_none(),
                "client Authorization must be stripped"
            );
            "ok"
        }),
    ))
    .await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/api/data?x=1")
                .header(header::AUTHORIZATION, "Bearer octroi_clientkey")
                .header("X-Custom", "v")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");

    let txns = p.sink.transactions.lock().unwrap();
    assert_eq!(txns.len(), 1);
    let tx = &txns[0];
    assert_eq!(tx.agent_id, "agent-1");
    assert_eq!(tx.tool_id, "tool-1");
    assert_eq!(tx.status_code, 200);
    assert!(tx.success);
    assert_eq!(tx.method, "GET");
    assert_eq!(tx.path, "/proxy/tool-1/api/data");
    assert_eq!(tx.response_size, 2);
}

#[tokio::test]
async fn forwards_post_bodies_and_upstream_headers() {
    let upstream = spawn_upstream(Router::new().route(
        "/echo",
        any(|req: AxumRequest| async move {
            let body = req.into_body().collect().await.unwrap().to_bytes();
            ([("X-Upstream", "true")], body)
        }),
    ))
    .await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(
            Request::post("/proxy/tool-1/echo")
                .body(Body::from(r#"{"query":"test"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("X-Upstream").unwrap(), "true");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], br#"{"query":"test"}"#);
}

#[tokio::test]
async fn injects_bearer_credentials() {
    let upstream = spawn_upstream(Router::new().route(
        "/{*path}",
        any(|headers: HeaderMap| async move {
            assert_eq!(
                headers.get(header::AUTHORIZATION).unwrap(),
                "Bearer secret-123"
            );
            "ok"
        }),
    ))
    .await;

    let mut tool = test_tool(&upstream);
    tool.auth_type = "bearer".into();
    tool.auth_config = HashMap::from([("key".to_string(), "secret-123".to_string())]);

    let p = pipeline(tool);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/v1/data")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn appends_query_credential_to_existing_params() {
    let upstream = spawn_upstream(Router::new().route(
        "/foo",
        any(|req: AxumRequest| async move {
            let query = req.uri().query().unwrap_or_default().to_string();
            assert!(query.contains("bar=baz"), "query was {query}");
            assert!(query.contains("api_key=s123"), "query was {query}");
            "ok"
        }),
    ))
    .await;

    let mut tool = test_tool(&upstream);
    tool.auth_type = "query".into();
    tool.auth_config = HashMap::from([("key".to_string(), "s123".to_string())]);

    let p = pipeline(tool);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/foo?bar=baz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_mode_resolves_endpoint_template() {
    let upstream = spawn_upstream(Router::new().route(
        "/v2/data",
        any(|| async { "versioned" }),
    ))
    .await;

    let mut tool = test_tool(&upstream);
    tool.mode = "api".into();
    tool.endpoint = format!("{upstream}/{{version}}");
    tool.variables = HashMap::from([("version".to_string(), "v2".to_string())]);

    let p = pipeline(tool);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/data")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"versioned");
}

#[tokio::test]
async fn api_mode_with_missing_variable_is_a_proxy_error() {
    let mut tool = test_tool("http://unused");
    tool.mode = "api".into();
    tool.endpoint = "http://{host}/api".into();
    tool.variables = HashMap::new();

    let p = pipeline(tool);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/data")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "proxy_error");
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let p = pipeline(test_tool("http://unused"));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/nonexistent/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn missing_agent_is_unauthorized() {
    let sink = Arc::new(FakeSink::default());
    let tools = Arc::new(FakeTools {
        tools: HashMap::from([("tool-1".to_string(), test_tool("http://unused"))]),
    });
    let budgets = Arc::new(FakeBudgets {
        agent_allowed: true,
        global_allowed: true,
    });
    let handler = ProxyHandler::new(tools, budgets, sink, Duration::from_secs(5), 1 << 20);

    // No agent extension layered in.
    let router = Router::new()
        .route("/proxy/{tool_id}/{*path}", any(proxy_request))
        .with_state(Arc::new(handler));

    let resp = router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn agent_budget_denial_never_reaches_upstream() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let upstream = spawn_upstream(Router::new().route(
        "/{*path}",
        any(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { "ok" }
        }),
    ))
    .await;

    let p = pipeline_with(test_tool(&upstream), false, true, None);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "budget_exceeded");
    assert_eq!(hits.load(Ordering::SeqCst), 0, "upstream must not be called");
    assert!(p.sink.transactions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn global_budget_denial_is_budget_exceeded() {
    let p = pipeline_with(test_tool("http://unused"), true, false, None);
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "budget_exceeded");
}

#[tokio::test]
async fn tool_rate_limit_reports_tightest_bucket() {
    let upstream = spawn_upstream(Router::new().route("/{*path}", any(|| async { "ok" }))).await;

    let resolver = Arc::new(FixedRates {
        global: 100,
        team: 10,
        agent: 2,
    });
    let limiter = Arc::new(Limiter::new(60, Duration::from_secs(60)));
    let tool_rates: Arc<dyn ToolRateLimitSource> =
        Arc::new(ToolRateLimiter::new(resolver, limiter));

    let p = pipeline_with(test_tool(&upstream), true, true, Some(tool_rates));

    for _ in 0..2 {
        let resp = p
            .router
            .clone()
            .oneshot(
                Request::get("/proxy/tool-1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("X-Tool-RateLimit-Limit").unwrap(), "2");
    }

    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers().get("X-Tool-RateLimit-Limit").unwrap(), "2");
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "tool_rate_limited");
}

#[tokio::test]
async fn reported_cost_header_overrides_flat_pricing() {
    let upstream = spawn_upstream(Router::new().route(
        "/{*path}",
        any(|| async { ([("X-Octroi-Cost", "0.05")], "ok") }),
    ))
    .await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let _ = resp.into_body().collect().await.unwrap();

    let txns = p.sink.transactions.lock().unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].cost, 0.05);
    assert_eq!(txns[0].cost_source, "reported");
}

#[tokio::test]
async fn invalid_cost_header_falls_back_to_flat_pricing() {
    let upstream = spawn_upstream(Router::new().route(
        "/{*path}",
        any(|| async { ([("X-Octroi-Cost", "-2")], "ok") }),
    ))
    .await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let _ = resp.into_body().collect().await.unwrap();

    let txns = p.sink.transactions.lock().unwrap();
    assert_eq!(txns[0].cost, 0.01);
    assert_eq!(txns[0].cost_source, "flat");
}

#[tokio::test]
async fn unreachable_upstream_records_a_failed_transaction() {
    // Nothing listens on this port.
    let p = pipeline(test_tool("http://127.0.0.1:1"));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert_eq!(json["error"]["code"], "proxy_error");

    let txns = p.sink.transactions.lock().unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].status_code, 502);
    assert!(!txns[0].success);
}

#[tokio::test]
async fn bare_proxy_path_maps_to_upstream_root() {
    let upstream = spawn_upstream(Router::new().route("/", any(|| async { "root" }))).await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(Request::get("/proxy/tool-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"root");
}

#[tokio::test]
async fn non_2xx_upstream_status_is_forwarded_and_marked_failed() {
    let upstream = spawn_upstream(Router::new().route(
        "/{*path}",
        any(|| async { (StatusCode::IM_A_TEAPOT, "short and stout").into_response() }),
    ))
    .await;

    let p = pipeline(test_tool(&upstream));
    let resp = p
        .router
        .oneshot(
            Request::get("/proxy/tool-1/brew")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    let _ = resp.into_body().collect().await.unwrap();

    let txns = p.sink.transactions.lock().unwrap();
    assert_eq!(txns[0].status_code, 418);
    assert!(!txns[0].success);
}
