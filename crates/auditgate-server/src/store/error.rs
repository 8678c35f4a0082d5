//! Persistence errors

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} record with ID '{id}' not found")]
    NotFound { table: &'static str, id: Uuid },

    #[error("{table} record with ID '{id}' already exists")]
    Conflict { table: &'static str, id: Uuid },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
