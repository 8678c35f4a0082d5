//! Gateway HTTP pipeline
//!
//! Layer order for the gated API, outermost first:
//! exchange audit → shared-secret gate → mandatory-header gate → handler.

use std::sync::Arc;

use axum::{middleware, Router};

use crate::audit::AuditPublisher;

pub mod exchange;
pub mod gate;
pub mod response;

pub use exchange::{ExchangeAuditLayer, ExchangeAuditMiddleware};
pub use gate::{
    check_mandatory_headers, check_shared_secret, require_mandatory_headers,
    require_shared_secret, MandatoryHeaders, Tier,
};
pub use response::{Domain, ResponseCatalog};

/// Default cap on buffered inbound request bodies (2 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Everything the gateway layers and handlers share
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub catalog: ResponseCatalog,
    /// Domain whose code table gateway-built responses use
    pub domain: Domain,
    pub shared_secret: String,
    pub mandatory: MandatoryHeaders,
    /// Stamped as `x-channel-id` on core-tier responses
    pub core_channel: String,
    pub publisher: AuditPublisher,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(publisher: AuditPublisher, shared_secret: impl Into<String>) -> Self {
        Self {
            catalog: ResponseCatalog::standard(),
            domain: Domain::Internal,
            shared_secret: shared_secret.into(),
            mandatory: MandatoryHeaders::default(),
            core_channel: String::new(),
            publisher,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_mandatory(mut self, mandatory: MandatoryHeaders) -> Self {
        self.mandatory = mandatory;
        self
    }

    pub fn with_core_channel(mut self, channel: impl Into<String>) -> Self {
        self.core_channel = channel.into();
        self
    }

    pub fn with_catalog(mut self, catalog: ResponseCatalog, domain: Domain) -> Self {
        self.catalog = catalog;
        self.domain = domain;
        self
    }
}

/// Wrap `router` with the audit and access-control layers
pub fn gated<S>(router: Router<S>, gateway: Arc<GatewayState>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(
            Arc::clone(&gateway),
            require_mandatory_headers,
        ))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&gateway),
            require_shared_secret,
        ))
        .layer(ExchangeAuditLayer::new(gateway))
}
