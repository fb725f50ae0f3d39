// ABOUTME: Shared storage primitives for the Octroi gateway
// ABOUTME: Postgres pool construction and the common StorageError type

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Storage errors shared by all store crates.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record not found")]
    NotFound,
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    /// True when the error is a missing-row condition, either from sqlx
    /// or already mapped to `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound | StorageError::Sqlx(sqlx::Error::RowNotFound)
        )
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Connect to Postgres with a bounded connection pool.
pub async fn connect(url: &str, max_connections: u32) -> StorageResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}
