// ABOUTME: Validated business logic over the tool registry store
// ABOUTME: Input validation for both service-mode and api-mode tools

use crate::store::ToolStore;
use crate::template::{resolve_template, TemplateError};
use crate::types::{CreateToolInput, Tool, ToolListParams, UpdateToolInput};
use octroi_storage::StorageError;
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

const VALID_MODES: &[&str] = &["service", "api"];
const VALID_AUTH_TYPES: &[&str] = &["none", "bearer", "header", "query"];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("name is required")]
    NameRequired,
    #[error("description is required")]
    DescriptionRequired,
    #[error("mode must be one of: service, api")]
    ModeInvalid,
    #[error("auth_type must be one of: none, bearer, header, query")]
    AuthTypeInvalid,
    #[error("endpoint must be a valid URL")]
    EndpointInvalid,
    #[error("template variable {0:?} is not defined")]
    VariablesMissing(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, RegistryError::Storage(_))
    }
}

/// Validated operations over the tool store.
pub struct ToolService {
    store: ToolStore,
}

impl ToolService {
    pub fn new(store: ToolStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, mut input: CreateToolInput) -> Result<Tool, RegistryError> {
        if input.mode.is_empty() {
            input.mode = "service".to_string();
        }
        if input.auth_type.is_empty() {
            input.auth_type = "none".to_string();
        }
        if input.pricing_model.is_empty() {
            input.pricing_model = "free".to_string();
        }
        validate_create(&input)?;
        Ok(self.store.create(input).await?)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Tool, StorageError> {
        self.store.get_by_id(id).await
    }

    pub async fn list(
        &self,
        params: ToolListParams,
    ) -> Result<(Vec<Tool>, Option<String>), StorageError> {
        self.store.list(params).await
    }

    pub async fn update(&self, id: &str, input: UpdateToolInput) -> Result<Tool, RegistryError> {
        // Partial validation needs the stored row for cross-field checks
        // (mode vs endpoint vs variables).
        let existing = self.store.get_by_id(id).await?;
        validate_update(&existing, &input)?;
        Ok(self.store.update(id, input).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(id).await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        cursor: Option<String>,
    ) -> Result<(Vec<Tool>, Option<String>), StorageError> {
        self.store
            .list(ToolListParams {
                cursor,
                limit,
                query: Some(query.to_string()),
            })
            .await
    }
}

fn validate_create(input: &CreateToolInput) -> Result<(), RegistryError> {
    if input.name.trim().is_empty() {
        return Err(RegistryError::NameRequired);
    }
    if input.description.trim().is_empty() {
        return Err(RegistryError::DescriptionRequired);
    }
    if !VALID_MODES.contains(&input.mode.as_str()) {
        return Err(RegistryError::ModeInvalid);
    }
    if !VALID_AUTH_TYPES.contains(&input.auth_type.as_str()) {
        return Err(RegistryError::AuthTypeInvalid);
    }
    validate_endpoint(&input.mode, &input.endpoint, &input.variables)
}

fn validate_update(existing: &Tool, input: &UpdateToolInput) -> Result<(), RegistryError> {
    if let Some(name) = &input.name {
        if name.trim().is_empty() {
            return Err(RegistryError::NameRequired);
        }
    }
    if let Some(description) = &input.description {
        if description.trim().is_empty() {
            return Err(RegistryError::DescriptionRequired);
        }
    }
    if let Some(mode) = &input.mode {
        if !VALID_MODES.contains(&mode.as_str()) {
            return Err(RegistryError::ModeInvalid);
        }
    }
    if let Some(auth_type) = &input.auth_type {
        if !VALID_AUTH_TYPES.contains(&auth_type.as_str()) {
            return Err(RegistryError::AuthTypeInvalid);
        }
    }

    // Re-validate the endpoint whenever any of mode/endpoint/variables change,
    // using the effective post-update values.
    if input.mode.is_some() || input.endpoint.is_some() || input.variables.is_some() {
        let mode = input.mode.as_deref().unwrap_or(&existing.mode);
        let endpoint = input.endpoint.as_deref().unwrap_or(&existing.endpoint);
        let variables = input.variables.as_ref().unwrap_or(&existing.variables);
        validate_endpoint(mode, endpoint, variables)?;
    }
    Ok(())
}

/// In service mode the endpoint must itself be an absolute URL. In api mode
/// the endpoint is a template; it must resolve completely against the
/// supplied variables and the resolved string must be an absolute URL.
fn validate_endpoint(
    mode: &str,
    endpoint: &str,
    variables: &HashMap<String, String>,
) -> Result<(), RegistryError> {
    if endpoint.trim().is_empty() {
        return Err(RegistryError::EndpointInvalid);
    }

    let effective = if mode == "api" {
        match resolve_template(endpoint, variables) {
            Ok(resolved) => resolved,
            Err(TemplateError::UndefinedVariable(name)) => {
                return Err(RegistryError::VariablesMissing(name))
            }
        }
    } else {
        endpoint.to_string()
    };

    let url = Url::parse(&effective).map_err(|_| RegistryError::EndpointInvalid)?;
    if url.scheme().is_empty() || !url.has_host() {
        return Err(RegistryError::EndpointInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> CreateToolInput {
        CreateToolInput {
            name: "jira".into(),
            description: "issue tracker".into(),
            mode: "service".into(),
            endpoint: "https://example.atlassian.net".into(),
            auth_type: "none".into(),
            ..Default::default()
        }
    }

    #[test]
    fn accepts_valid_service_tool() {
        assert!(validate_create(&base_input()).is_ok());
    }

    #[test]
    fn rejects_blank_name_and_description() {
        let mut input = base_input();
        input.name = "   ".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::NameRequired)
        ));

        let mut input = base_input();
        input.description = "".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::DescriptionRequired)
        ));
    }

    #[test]
    fn rejects_unknown_mode_and_auth_type() {
        let mut input = base_input();
        input.mode = "tunnel".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::ModeInvalid)
        ));

        let mut input = base_input();
        input.auth_type = "hmac".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::AuthTypeInvalid)
        ));
    }

    #[test]
    fn service_mode_requires_absolute_url() {
        let mut input = base_input();
        input.endpoint = "not a url".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::EndpointInvalid)
        ));

        input.endpoint = "/relative/path".into();
        assert!(matches!(
            validate_create(&input),
            Err(RegistryError::EndpointInvalid)
        ));
    }

    #[test]
    fn api_mode_resolves_template_before_validation() {
        let mut input = base_input();
        input.mode = "api".into();
        input.endpoint = "https://{instance}.atlassian.net/{version}".into();
        input.variables = HashMap::from([
            ("instance".to_string(), "acme".to_string()),
            ("version".to_string(), "v3".to_string()),
        ]);
        assert!(validate_create(&input).is_ok());
    }

    #[test]
    fn api_mode_missing_variable_names_the_placeholder() {
        let mut input = base_input();
        input.mode = "api".into();
        input.endpoint = "https://{instance}.atlassian.net/{version}".into();
        input.variables = HashMap::from([("instance".to_string(), "acme".to_string())]);
        match validate_create(&input) {
            Err(RegistryError::VariablesMissing(name)) => assert_eq!(name, "version"),
            other => panic!("expected VariablesMissing, got {other:?}"),
        }
    }

    #[test]
    fn update_revalidates_effective_endpoint() {
        let existing = Tool {
            id: "t1".into(),
            name: "jira".into(),
            description: "issue tracker".into(),
            mode: "api".into(),
            endpoint: "https://{instance}.atlassian.net".into(),
            auth_type: "none".into(),
            auth_config: HashMap::new(),
            variables: HashMap::from([("instance".to_string(), "acme".to_string())]),
            pricing_model: "free".into(),
            pricing_amount: 0.0,
            pricing_currency: "USD".into(),
            rate_limit: 0,
            budget_limit: 0.0,
            budget_window: "monthly".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        // Dropping the variables map breaks the stored template.
        let input = UpdateToolInput {
            variables: Some(HashMap::new()),
            ..Default::default()
        };
        assert!(matches!(
            validate_update(&existing, &input),
            Err(RegistryError::VariablesMissing(_))
        ));

        // Switching to service mode makes the raw template invalid as a URL?
        // No: a template string still parses as a URL with a host, so the
        // mode switch alone is accepted.
        let input = UpdateToolInput {
            mode: Some("service".into()),
            endpoint: Some("https://plain.example.com".into()),
            ..Default::default()
        };
        assert!(validate_update(&existing, &input).is_ok());
    }
}
