// ABOUTME: The authenticating reverse proxy at the core of the gateway
// ABOUTME: Admission pipeline: rate limits, budgets, credential injection, streaming

pub mod body;
pub mod handler;
pub mod sources;

pub use handler::{proxy_request, ProxyHandler};
pub use sources::{BudgetSource, MetricsHook, ToolRateLimitSource, ToolSource, TransactionSink};
