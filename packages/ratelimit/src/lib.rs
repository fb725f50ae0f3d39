// ABOUTME: In-memory token-bucket rate limiting
// ABOUTME: Per-agent middleware and per-tool scoped limits over one shared limiter

pub mod limiter;
pub mod middleware;
pub mod tool_limiter;
pub mod tool_store;

pub use limiter::{Clock, Limiter, SystemClock};
pub use middleware::{agent_rate_limit, RateLimitLayer};
pub use tool_limiter::{RateResolver, ToolRateDecision, ToolRateLimiter};
pub use tool_store::{ToolRateLimitStore, ToolRateOverride};
