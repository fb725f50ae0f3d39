// ABOUTME: The proxy request handler
// ABOUTME: Orchestrates lookup, rate limits, budgets, forwarding, and metering

use crate::body::{LimitedStream, MeteredStream};
use crate::sources::{BudgetSource, MetricsHook, ToolRateLimitSource, ToolSource, TransactionSink};
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use octroi_auth::Agent;
use octroi_metering::Transaction;
use octroi_ratelimit::ToolRateDecision;
use octroi_registry::{resolve_template, Tool};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};
use url::Url;

/// Headers never forwarded upstream. Authorization is replaced by the
/// tool's own credentials; the rest are connection-scoped.
const SKIP_REQUEST_HEADERS: &[&str] = &[
    "authorization",
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
];

/// Hop-by-hop response headers that must not be copied back to the client;
/// everything else is forwarded verbatim, multi-value included.
const SKIP_RESPONSE_HEADERS: &[&str] = &["transfer-encoding", "connection"];

/// Upstream header that overrides the tool's flat per-request price.
const COST_HEADER: &str = "x-octroi-cost";

/// Proxies requests to tool endpoints after running the admission pipeline.
pub struct ProxyHandler {
    tools: Arc<dyn ToolSource>,
    budgets: Arc<dyn BudgetSource>,
    collector: Arc<dyn TransactionSink>,
    tool_rate_limits: Option<Arc<dyn ToolRateLimitSource>>,
    metrics: Option<Arc<dyn MetricsHook>>,
    client: reqwest::Client,
    max_request_size: u64,
}

impl ProxyHandler {
    pub fn new(
        tools: Arc<dyn ToolSource>,
        budgets: Arc<dyn BudgetSource>,
        collector: Arc<dyn TransactionSink>,
        timeout: Duration,
        max_request_size: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            tools,
            budgets,
            collector,
            tool_rate_limits: None,
            metrics: None,
            client,
            max_request_size,
        }
    }

    pub fn with_tool_rate_limits(mut self, checker: Arc<dyn ToolRateLimitSource>) -> Self {
        self.tool_rate_limits = Some(checker);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsHook>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn handle(&self, tool_id: &str, req: Request) -> Response {
        if tool_id.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "bad_request", "missing tool ID");
        }

        let tool = match self.tools.get_by_id(tool_id).await {
            Ok(tool) => tool,
            Err(_) => {
                return error_response(StatusCode::NOT_FOUND, "not_found", "tool not found")
            }
        };

        let agent = match req.extensions().get::<Agent>() {
            Some(agent) => agent.clone(),
            None => {
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "missing agent credentials",
                )
            }
        };

        // Per-tool rate limits across global/team/agent scopes. A store
        // error here skips the check rather than rejecting the request.
        let mut tool_rate: Option<ToolRateDecision> = None;
        if let Some(checker) = &self.tool_rate_limits {
            match checker.check(&tool.id, &agent.team, &agent.id).await {
                Ok(decision) => {
                    tool_rate = decision;
                    if let Some(d) = &tool_rate {
                        if !d.allowed {
                            if let Some(m) = &self.metrics {
                                m.tool_rate_limit_rejection();
                            }
                            let mut resp = error_response(
                                StatusCode::TOO_MANY_REQUESTS,
                                "tool_rate_limited",
                                "tool rate limit exceeded",
                            );
                            set_tool_rate_headers(&mut resp, d);
                            return resp;
                        }
                    }
                }
                Err(err) => warn!(tool_id, error = %err, "tool rate limit check failed"),
            }
        }

        // Budget checks are best-effort reads over the transaction log.
        // Query errors fail open: metering lag must not black-hole a tool.
        match self.budgets.check_budget(&agent.id, &tool.id).await {
            Ok(decision) if !decision.allowed => {
                if let Some(m) = &self.metrics {
                    m.budget_rejection("agent");
                }
                let mut resp = error_response(
                    StatusCode::FORBIDDEN,
                    "budget_exceeded",
                    "agent budget exceeded for this tool",
                );
                apply_tool_rate(&mut resp, &tool_rate);
                return resp;
            }
            Ok(_) => {}
            Err(err) => warn!(tool_id, error = %err, "agent budget check failed; allowing"),
        }

        match self.budgets.check_tool_global_budget(&tool.id).await {
            Ok(decision) if !decision.allowed => {
                if let Some(m) = &self.metrics {
                    m.budget_rejection("global");
                }
                let mut resp = error_response(
                    StatusCode::FORBIDDEN,
                    "budget_exceeded",
                    "global tool budget exceeded",
                );
                apply_tool_rate(&mut resp, &tool_rate);
                return resp;
            }
            Ok(_) => {}
            Err(err) => warn!(tool_id, error = %err, "global budget check failed; allowing"),
        }

        // Resolve the endpoint for api-mode tools.
        let endpoint = if tool.mode == "api" {
            match resolve_template(&tool.endpoint, &tool.variables) {
                Ok(resolved) => resolved,
                Err(err) => {
                    error!(tool_id, error = %err, "endpoint template resolution failed");
                    let mut resp = error_response(
                        StatusCode::BAD_GATEWAY,
                        "proxy_error",
                        "failed to resolve endpoint template",
                    );
                    apply_tool_rate(&mut resp, &tool_rate);
                    return resp;
                }
            }
        } else {
            tool.endpoint.clone()
        };

        let (parts, body) = req.into_parts();

        // Strip the /proxy/{toolID} prefix to get the upstream path.
        let proxy_prefix = format!("/proxy/{tool_id}");
        let incoming_path = parts.uri.path();
        let upstream_path = incoming_path
            .strip_prefix(&proxy_prefix)
            .unwrap_or(incoming_path);
        let upstream_path = if upstream_path.is_empty() {
            "/"
        } else {
            upstream_path
        };

        let mut target = format!("{}{}", endpoint.trim_end_matches('/'), upstream_path);
        if let Some(query) = parts.uri.query() {
            target.push('?');
            target.push_str(query);
        }
        let mut target_url = match Url::parse(&target) {
            Ok(url) => url,
            Err(err) => {
                error!(tool_id, error = %err, "failed to build upstream URL");
                let mut resp = error_response(
                    StatusCode::BAD_GATEWAY,
                    "proxy_error",
                    "failed to build upstream request",
                );
                apply_tool_rate(&mut resp, &tool_rate);
                return resp;
            }
        };

        // Forward request headers, dropping the caller's Authorization and
        // connection-scoped headers. Multi-value headers are preserved.
        let mut out_headers = HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if !SKIP_REQUEST_HEADERS.contains(&name.as_str()) {
                out_headers.append(name.clone(), value.clone());
            }
        }

        inject_credentials(&tool, &mut out_headers, &mut target_url);

        let request_size = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);

        let pending = PendingTransaction {
            agent_id: agent.id.clone(),
            tool_id: tool.id.clone(),
            pricing_model: tool.pricing_model.clone(),
            pricing_amount: tool.pricing_amount,
            method: parts.method.to_string(),
            path: incoming_path.to_string(),
            request_size,
        };

        // Stream the request body through a size cap rather than buffering.
        let limited = LimitedStream::new(body.into_data_stream(), self.max_request_size + 1);
        let upstream_req = self
            .client
            .request(parts.method.clone(), target_url)
            .headers(out_headers)
            .body(reqwest::Body::wrap_stream(limited));

        let start = Instant::now();
        let result = upstream_req.send().await;
        let latency = start.elapsed();

        if let Some(m) = &self.metrics {
            m.upstream_duration(&tool.id, latency.as_secs_f64());
        }

        let upstream = match result {
            Ok(upstream) => upstream,
            Err(err) => {
                let kind = classify_upstream_error(&err);
                error!(tool_id, error = %err, kind, "upstream request failed");
                if let Some(m) = &self.metrics {
                    m.proxy_request(&tool.id, &pending.method, 502);
                    m.upstream_error(kind, &tool.id);
                }
                self.collector.record(pending.into_transaction(
                    502,
                    latency.as_millis() as i64,
                    0,
                    false,
                    None,
                ));
                let mut resp = error_response(
                    StatusCode::BAD_GATEWAY,
                    "proxy_error",
                    "upstream request failed",
                );
                apply_tool_rate(&mut resp, &tool_rate);
                return resp;
            }
        };

        let status = upstream.status();
        if let Some(m) = &self.metrics {
            m.proxy_request(&tool.id, &pending.method, status.as_u16());
        }

        // Capture the cost header before the response headers are copied.
        let reported_cost = upstream
            .headers()
            .get(COST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut response_headers = HeaderMap::new();
        for (name, value) in upstream.headers().iter() {
            if !SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
                response_headers.append(name.clone(), value.clone());
            }
        }

        // The transaction is recorded once the response body has fully
        // streamed (or the client hung up), so response_size is accurate.
        let collector = self.collector.clone();
        let latency_ms = latency.as_millis() as i64;
        let success = status.is_success();
        let status_code = status.as_u16() as i32;
        let metered = MeteredStream::new(Box::pin(upstream.bytes_stream()), move |response_size| {
            collector.record(pending.into_transaction(
                status_code,
                latency_ms,
                response_size as i64,
                success,
                reported_cost.as_deref(),
            ));
        });

        let mut resp = match Response::builder()
            .status(status)
            .body(Body::from_stream(metered))
        {
            Ok(resp) => resp,
            Err(err) => {
                error!(tool_id, error = %err, "failed to build response");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "failed to build response",
                );
            }
        };
        *resp.headers_mut() = response_headers;
        apply_tool_rate(&mut resp, &tool_rate);
        resp
    }
}

/// Axum entrypoint for `/proxy/{tool_id}` and `/proxy/{tool_id}/{*path}`.
pub async fn proxy_request(
    State(handler): State<Arc<ProxyHandler>>,
    Path(params): Path<HashMap<String, String>>,
    req: Request,
) -> Response {
    let tool_id = params.get("tool_id").cloned().unwrap_or_default();
    handler.handle(&tool_id, req).await
}

/// A transaction minus the fields only known after the upstream call.
struct PendingTransaction {
    agent_id: String,
    tool_id: String,
    pricing_model: String,
    pricing_amount: f64,
    method: String,
    path: String,
    request_size: i64,
}

impl PendingTransaction {
    fn into_transaction(
        self,
        status_code: i32,
        latency_ms: i64,
        response_size: i64,
        success: bool,
        reported_cost: Option<&str>,
    ) -> Transaction {
        let (cost, cost_source) =
            derive_cost(reported_cost, &self.pricing_model, self.pricing_amount);
        Transaction {
            id: String::new(),
            agent_id: self.agent_id,
            tool_id: self.tool_id,
            timestamp: Utc::now(),
            method: self.method,
            path: self.path,
            status_code,
            latency_ms,
            request_size: self.request_size,
            response_size,
            success,
            cost,
            cost_source: cost_source.to_string(),
            error: String::new(),
        }
    }
}

/// An upstream-reported cost wins when it parses as a non-negative float;
/// otherwise per_request pricing falls back to the tool's flat amount.
fn derive_cost(
    reported: Option<&str>,
    pricing_model: &str,
    pricing_amount: f64,
) -> (f64, &'static str) {
    if let Some(raw) = reported {
        if let Ok(value) = raw.trim().parse::<f64>() {
            if value.is_finite() && value >= 0.0 {
                return (value, "reported");
            }
        }
    }
    if pricing_model == "per_request" {
        (pricing_amount, "flat")
    } else {
        (0.0, "flat")
    }
}

/// Inject the tool's stored credentials per its auth_type.
fn inject_credentials(tool: &Tool, headers: &mut HeaderMap, url: &mut Url) {
    let key = tool.auth_config.get("key").cloned().unwrap_or_default();
    match tool.auth_type.as_str() {
        "bearer" => {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(header::AUTHORIZATION, value);
            }
        }
        "header" => {
            let header_name = tool
                .auth_config
                .get("header_name")
                .cloned()
                .unwrap_or_default();
            if !header_name.is_empty() {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::try_from(header_name),
                    HeaderValue::from_str(&key),
                ) {
                    headers.insert(name, value);
                }
            }
        }
        "query" => {
            let param = tool
                .auth_config
                .get("param_name")
                .filter(|p| !p.is_empty())
                .map(String::as_str)
                .unwrap_or("api_key");
            url.query_pairs_mut().append_pair(param, &key);
        }
        _ => {}
    }
}

/// Categorize an upstream client error for metrics and logging.
fn classify_upstream_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return "timeout";
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return match io.kind() {
                std::io::ErrorKind::ConnectionRefused => "connection_refused",
                std::io::ErrorKind::TimedOut => "timeout",
                std::io::ErrorKind::Interrupted => "canceled",
                _ => "network",
            };
        }
        if cause.to_string().to_ascii_lowercase().contains("dns") {
            return "dns";
        }
        source = cause.source();
    }
    if err.is_connect() {
        "connection_refused"
    } else {
        "other"
    }
}

fn apply_tool_rate(resp: &mut Response, decision: &Option<ToolRateDecision>) {
    if let Some(d) = decision {
        set_tool_rate_headers(resp, d);
    }
}

fn set_tool_rate_headers(resp: &mut Response, d: &ToolRateDecision) {
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&d.limit.to_string()) {
        headers.insert("X-Tool-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&d.remaining.to_string()) {
        headers.insert("X-Tool-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&d.reset_at.timestamp().to_string()) {
        headers.insert("X-Tool-RateLimit-Reset", v);
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_cost_wins_when_valid() {
        assert_eq!(derive_cost(Some("0.05"), "per_request", 0.01), (0.05, "reported"));
        assert_eq!(derive_cost(Some("0"), "per_request", 0.01), (0.0, "reported"));
    }

    #[test]
    fn invalid_or_negative_reported_cost_falls_back_to_flat() {
        assert_eq!(derive_cost(Some("abc"), "per_request", 0.01), (0.01, "flat"));
        assert_eq!(derive_cost(Some("-1"), "per_request", 0.01), (0.01, "flat"));
        assert_eq!(derive_cost(Some("NaN"), "per_request", 0.01), (0.01, "flat"));
    }

    #[test]
    fn free_tools_cost_nothing_without_a_report() {
        assert_eq!(derive_cost(None, "free", 0.5), (0.0, "flat"));
        assert_eq!(derive_cost(None, "per_request", 0.25), (0.25, "flat"));
    }

    #[test]
    fn bearer_injection_sets_authorization() {
        let tool = test_tool("bearer", &[("key", "secret-123")]);
        let mut headers = HeaderMap::new();
        let mut url = Url::parse("http://upstream/x").unwrap();
        inject_credentials(&tool, &mut headers, &mut url);
        assert_eq!(headers[header::AUTHORIZATION], "Bearer secret-123");
    }

    #[test]
    fn header_injection_uses_configured_name() {
        let tool = test_tool("header", &[("key", "k1"), ("header_name", "X-Api-Key")]);
        let mut headers = HeaderMap::new();
        let mut url = Url::parse("http://upstream/x").unwrap();
        inject_credentials(&tool, &mut headers, &mut url);
        assert_eq!(headers["x-api-key"], "k1");
    }

    #[test]
    fn query_injection_defaults_the_param_name() {
        let tool = test_tool("query", &[("key", "s123")]);
        let mut headers = HeaderMap::new();
        let mut url = Url::parse("http://upstream/foo?bar=baz").unwrap();
        inject_credentials(&tool, &mut headers, &mut url);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("bar".into(), "baz".into())));
        assert!(pairs.contains(&("api_key".into(), "s123".into())));
    }

    #[test]
    fn none_auth_leaves_the_request_untouched() {
        let tool = test_tool("none", &[]);
        let mut headers = HeaderMap::new();
        let mut url = Url::parse("http://upstream/x").unwrap();
        inject_credentials(&tool, &mut headers, &mut url);
        assert!(headers.is_empty());
        assert!(url.query().is_none());
    }

    fn test_tool(auth_type: &str, config: &[(&str, &str)]) -> Tool {
        Tool {
            id: "tool-1".into(),
            name: "t".into(),
            description: "d".into(),
            mode: "service".into(),
            endpoint: "http://upstream".into(),
            auth_type: auth_type.into(),
            auth_config: config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            variables: Default::default(),
            pricing_model: "free".into(),
            pricing_amount: 0.0,
            pricing_currency: "USD".into(),
            rate_limit: 0,
            budget_limit: 0.0,
            budget_window: "monthly".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
