// ABOUTME: HTTP handler modules for the gateway API
// ABOUTME: Grouped by resource; all share the ApiError envelope

pub mod agents;
pub mod auth;
pub mod health;
pub mod tool_rate_limits;
pub mod tools;
pub mod usage;
pub mod users;

use crate::error::ApiError;

/// Parse an optional `limit` query value: absent means "use the store
/// default", anything below 1 is rejected.
pub(crate) fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    match limit {
        None => Ok(0),
        Some(l) if l >= 1 => Ok(l),
        Some(_) => Err(ApiError::invalid_params(
            "limit must be a positive integer",
        )),
    }
}
