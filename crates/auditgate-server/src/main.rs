//! Auditgate Server - Main entry point

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use auditgate_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{info, warn};

use auditgate_server::{
    audit::{AuditPublisher, RestProxyTransport, TracingTransport, Transport},
    config::Config,
    create_router,
    gateway::{GatewayState, ResponseCatalog},
    store::{AuditedStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; LOG_* environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("auditgate-server")
        .filter_directives("auditgate_server=debug,tower_http=debug,sqlx=warn,audit=info")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting Auditgate Server");

    let config = Config::load()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;
    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    let publish_timeout = Duration::from_secs(config.audit.publish_timeout_secs);
    let transport: Arc<dyn Transport> = match &config.audit.broker_url {
        Some(url) => Arc::new(RestProxyTransport::new(url.as_str(), publish_timeout)?),
        None => {
            warn!("AUDIT_BROKER_URL not set, audit events go to the 'audit' log target");
            Arc::new(TracingTransport)
        },
    };
    let (publisher, publisher_handle) =
        AuditPublisher::spawn(transport, config.audit.publisher_settings());
    info!(topic = %config.audit.topic, "Audit publisher started");

    let store = AuditedStore::new(
        PgStore::new(db_pool),
        publisher.clone(),
        config.database.database_name(),
        &config.database.url,
    );
    let gateway = GatewayState::new(publisher, config.gateway.shared_secret.clone())
        .with_mandatory(config.gateway.mandatory())
        .with_core_channel(config.gateway.core_channel.clone())
        .with_catalog(ResponseCatalog::standard(), config.gateway.domain);

    let state = AppState {
        store: Arc::new(store),
        gateway: Arc::new(gateway),
    };
    let app = create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server shut down gracefully");

    // Router and state are gone, so the last publisher handle is dropped.
    publisher_handle
        .drain(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
