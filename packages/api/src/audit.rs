// ABOUTME: Audit logging for admin mutations
// ABOUTME: Structured entries tagged audit=true for log-based review

use tracing::info;

/// Record an admin mutation in the structured log.
pub fn audit_log(action: &str, resource: &str, id: &str) {
    info!(audit = true, action, resource, id, "admin action");
}
