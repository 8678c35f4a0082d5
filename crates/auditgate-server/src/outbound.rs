//! Audited outbound HTTP calls
//!
//! The operation type of each call is the URL path and the target is the
//! full URL. Correlation and STAN IDs are forwarded downstream.

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::audit::{AuditContext, AuditPublisher, Operation};
use crate::headers;

/// Default timeout for downstream calls
pub const DEFAULT_OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("Invalid outbound URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Outbound request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Downstream returned status {status}")]
    Status { status: u16, body: JsonValue },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundResponse {
    pub status: u16,
    pub body: JsonValue,
}

#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: reqwest::Client,
    publisher: AuditPublisher,
}

impl HttpHandler {
    pub fn new(publisher: AuditPublisher, timeout: Duration) -> Result<Self, OutboundError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("auditgate/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, publisher))
    }

    pub fn with_client(client: reqwest::Client, publisher: AuditPublisher) -> Self {
        Self { client, publisher }
    }

    /// Send `payload` as JSON (if any) and parse the reply as JSON, falling
    /// back to text. Non-2xx replies are errors carrying the parsed body.
    pub async fn request(
        &self,
        ctx: &AuditContext,
        channel: &str,
        method: Method,
        url: &str,
        payload: Option<JsonValue>,
    ) -> Result<OutboundResponse, OutboundError> {
        let parsed = Url::parse(url);
        let name = match &parsed {
            Ok(u) => u.path().to_string(),
            Err(_) => url.to_string(),
        };
        let input = payload.clone().unwrap_or(JsonValue::Null);

        Operation::new(channel, name, url)
            .caller("HttpHandler::request")
            .run(
                &self.publisher,
                ctx,
                input,
                || self.send(ctx, method, parsed, url, payload),
                |response| serde_json::to_value(response).unwrap_or(JsonValue::Null),
            )
            .await
    }

    async fn send(
        &self,
        ctx: &AuditContext,
        method: Method,
        parsed: Result<Url, url::ParseError>,
        raw: &str,
        payload: Option<JsonValue>,
    ) -> Result<OutboundResponse, OutboundError> {
        let url = parsed.map_err(|e| OutboundError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(headers::CORRELATION_ID, ctx.correlation_id())
            .header(headers::STAN_ID, ctx.stan_id());
        if let Some(body) = &payload {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()));

        debug!(method = %method, url = %url, status = status.as_u16(), "Outbound call completed");

        if !status.is_success() {
            return Err(OutboundError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(OutboundResponse {
            status: status.as_u16(),
            body,
        })
    }
}
