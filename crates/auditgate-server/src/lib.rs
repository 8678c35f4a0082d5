//! Auditgate Server Library
//!
//! Gateway middleware that mirrors every inbound exchange, every database
//! operation and every outbound HTTP call to an audit topic.
//!
//! # Overview
//!
//! - **Audit pipeline** ([`audit`]): event building, secret redaction, a
//!   bounded fire-and-forget publisher and pluggable transports
//! - **Gateway** ([`gateway`]): shared-secret and mandatory-header gates,
//!   response-code catalog, inbound exchange auditing
//! - **Persistence** ([`store`]): JSON document store on Postgres (SQLx) or
//!   in memory, wrapped by audited capabilities
//! - **Outbound** ([`outbound`]): audited reqwest client
//!
//! Each audited operation publishes a REQUEST event, runs, then publishes a
//! RESPONSE event. Publishing never blocks the caller and its failures never
//! change the operation's result.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use auditgate_server::{
//!     audit::{AuditPublisher, PublisherSettings, TracingTransport},
//!     config::Config,
//!     gateway::GatewayState,
//!     store::{AuditedStore, MemoryStore},
//!     AppState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let (publisher, _handle) =
//!         AuditPublisher::spawn(Arc::new(TracingTransport), PublisherSettings::default());
//!     let state = AppState {
//!         store: Arc::new(AuditedStore::new(MemoryStore::new(), publisher.clone(), "local", "memory://local")),
//!         gateway: Arc::new(GatewayState::new(publisher, config.gateway.shared_secret.clone())),
//!     };
//!     let app = auditgate_server::create_router(state, &config.cors);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

pub mod audit;
pub mod config;
pub mod error;
pub mod features;
pub mod gateway;
pub mod headers;
pub mod middleware;
pub mod outbound;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

use config::CorsConfig;
use features::records::{self, RecordsState};
use gateway::GatewayState;
use store::{AuditedStore, RecordStore};

/// Shared application state
pub struct AppState<S> {
    pub store: Arc<AuditedStore<S>>,
    pub gateway: Arc<GatewayState>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
        }
    }
}

/// Build the application router with all routes and middleware.
///
/// `/health` is ungated; everything under `/api/v1` passes through the
/// exchange audit layer and both access gates.
pub fn create_router<S: RecordStore>(state: AppState<S>, cors: &CorsConfig) -> Router {
    let api = records::router(RecordsState {
        store: Arc::clone(&state.store),
        gateway: Arc::clone(&state.gateway),
    });
    let api = gateway::gated(api, Arc::clone(&state.gateway));

    Router::new()
        .route("/health", get(health_check::<S>))
        .with_state(state)
        .nest("/api/v1", api)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

/// Health check handler
async fn health_check<S: RecordStore>(State(state): State<AppState<S>>) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "unreachable" })),
            )
                .into_response()
        },
    }
}
