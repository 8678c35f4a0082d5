//! Audit delivery errors
//!
//! None of these reach a caller of an audited operation; they are logged
//! and the event is dropped.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize audit event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit transport request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audit broker rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Audit transport unavailable: {0}")]
    Unavailable(String),

    #[error("Audit queue is full")]
    QueueFull,

    #[error("Audit publisher is closed")]
    Closed,

    #[error("Audit delivery timed out after {0:?}")]
    Timeout(Duration),
}
