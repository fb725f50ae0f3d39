// ABOUTME: The API error type and its JSON envelope
// ABOUTME: Every error surfaces as {"error":{"code","message"}} with a matching status

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use octroi_registry::RegistryError;
use octroi_storage::StorageError;
use serde_json::json;
use tracing::error;

/// An API error carrying the HTTP status, a machine-readable code, and a
/// human-readable message. Internal detail never reaches the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn invalid_body() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_body",
            "failed to parse request body",
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_params", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            message,
        )
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "constraint_error", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"error": {"code": self.code, "message": self.message}})),
        )
            .into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if err.is_not_found() {
            return ApiError::not_found("resource not found");
        }
        match err {
            StorageError::InvalidCursor(msg) => {
                ApiError::invalid_params(format!("invalid cursor: {msg}"))
            }
            // Unique and foreign-key violations (SQLSTATE class 23) mean the
            // request conflicts with existing rows, not a server fault.
            StorageError::Sqlx(sqlx::Error::Database(db))
                if db.code().is_some_and(|c| c.starts_with("23")) =>
            {
                ApiError::constraint("conflicts with an existing record")
            }
            err => {
                error!(error = %err, "storage error");
                ApiError::internal("internal error")
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Storage(inner) => inner.into(),
            err => ApiError::validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn envelope_shape() {
        let resp = ApiError::not_found("tool not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "tool not found");
    }

    #[test]
    fn storage_not_found_maps_to_404() {
        let err: ApiError = StorageError::NotFound.into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = StorageError::Sqlx(sqlx::Error::RowNotFound).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_cursor_errors_map_to_400() {
        let err: ApiError = StorageError::InvalidCursor("bad".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn registry_validation_maps_to_422() {
        let err: ApiError = RegistryError::NameRequired.into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "validation_error");

        let err: ApiError = RegistryError::VariablesMissing("host".into()).into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message.contains("host"));
    }
}
