// ABOUTME: Tool type definitions
// ABOUTME: Structures for registered tools and their create/update inputs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tool registered in the Octroi gateway.
///
/// The endpoint, credential material, and template variables are omitted
/// from serialization so the default JSON view is safe for unprivileged
/// callers. Admin responses use [`Tool::admin_view`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub mode: String,
    #[serde(skip_serializing)]
    pub endpoint: String,
    pub auth_type: String,
    #[serde(skip_serializing)]
    pub auth_config: HashMap<String, String>,
    #[serde(skip_serializing)]
    pub variables: HashMap<String, String>,
    pub pricing_model: String,
    pub pricing_amount: f64,
    pub pricing_currency: String,
    pub rate_limit: i32,
    pub budget_limit: f64,
    pub budget_window: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// Full view including endpoint and credential material, for admin
    /// responses only.
    pub fn admin_view(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "mode": self.mode,
            "endpoint": self.endpoint,
            "auth_type": self.auth_type,
            "auth_config": self.auth_config,
            "variables": self.variables,
            "pricing_model": self.pricing_model,
            "pricing_amount": self.pricing_amount,
            "pricing_currency": self.pricing_currency,
            "rate_limit": self.rate_limit,
            "budget_limit": self.budget_limit,
            "budget_window": self.budget_window,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

/// Fields required to create a new tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateToolInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub mode: String,
    pub endpoint: String,
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub auth_config: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub pricing_model: String,
    #[serde(default)]
    pub pricing_amount: f64,
    #[serde(default)]
    pub pricing_currency: String,
    #[serde(default)]
    pub rate_limit: i32,
    #[serde(default)]
    pub budget_limit: f64,
    #[serde(default)]
    pub budget_window: String,
}

/// Fields that can be updated on a tool. Only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateToolInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub mode: Option<String>,
    pub endpoint: Option<String>,
    pub auth_type: Option<String>,
    pub auth_config: Option<HashMap<String, String>>,
    pub variables: Option<HashMap<String, String>>,
    pub pricing_model: Option<String>,
    pub pricing_amount: Option<f64>,
    pub pricing_currency: Option<String>,
    pub rate_limit: Option<i32>,
    pub budget_limit: Option<f64>,
    pub budget_window: Option<String>,
}

impl UpdateToolInput {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.mode.is_none()
            && self.endpoint.is_none()
            && self.auth_type.is_none()
            && self.auth_config.is_none()
            && self.variables.is_none()
            && self.pricing_model.is_none()
            && self.pricing_amount.is_none()
            && self.pricing_currency.is_none()
            && self.rate_limit.is_none()
            && self.budget_limit.is_none()
            && self.budget_window.is_none()
    }
}

/// Listing and pagination controls for tools.
#[derive(Debug, Clone, Default)]
pub struct ToolListParams {
    pub cursor: Option<String>,
    pub limit: i64,
    pub query: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_serialization_hides_credentials() {
        let tool = Tool {
            id: "t1".into(),
            name: "jira".into(),
            description: "issue tracker".into(),
            mode: "service".into(),
            endpoint: "https://example.com".into(),
            auth_type: "bearer".into(),
            auth_config: HashMap::from([("key".to_string(), "secret".to_string())]),
            variables: HashMap::new(),
            pricing_model: "free".into(),
            pricing_amount: 0.0,
            pricing_currency: "USD".into(),
            rate_limit: 0,
            budget_limit: 0.0,
            budget_window: "monthly".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&tool).unwrap();
        assert!(json.get("endpoint").is_none());
        assert!(json.get("auth_config").is_none());
        assert!(json.get("variables").is_none());
        assert_eq!(json["name"], "jira");

        let admin = tool.admin_view();
        assert_eq!(admin["endpoint"], "https://example.com");
        assert_eq!(admin["auth_config"]["key"], "secret");
    }
}
