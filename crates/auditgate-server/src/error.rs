//! Server error types
//!
//! Handler errors never change the HTTP status: the gateway contract is
//! HTTP 200 with the outcome in the response-code headers.

use axum::response::Response;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::gateway::{
    response::{FORMAT_ERROR_CODE, SUCCESS_CODE, UNDEFINED_ERROR_CODE},
    GatewayState,
};
use crate::outbound::OutboundError;
use crate::store::StoreError;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Outbound call failed: {0}")]
    Outbound(#[from] OutboundError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Response code reported for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_)
            | AppError::Store(StoreError::InvalidFilter(_))
            | AppError::Store(StoreError::Serialization(_)) => FORMAT_ERROR_CODE,
            _ => UNDEFINED_ERROR_CODE,
        }
    }

    /// Message safe to return to the caller
    fn public_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Database(e)) => {
                tracing::error!(error = ?e, "Database error");
                "A database error occurred".to_string()
            },
            AppError::Store(StoreError::InvalidQuery(message)) => {
                tracing::error!(error = %message, "Invalid query");
                "An internal query error occurred".to_string()
            },
            AppError::Outbound(e) => {
                tracing::error!(error = %e, "Outbound call failed");
                e.to_string()
            },
            AppError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                message.clone()
            },
            other => other.to_string(),
        }
    }
}

impl GatewayState {
    /// Success body under `00`, or the error under its code
    pub fn reply<T: Serialize>(&self, result: AppResult<T>) -> Response {
        match result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
        }) {
            Ok(body) => self.catalog.respond(self.domain, SUCCESS_CODE, body),
            Err(e) => {
                let code = e.code();
                let body = json!({ "error": { "message": e.public_message() } });
                self.catalog.respond(self.domain, code, body)
            },
        }
    }
}
