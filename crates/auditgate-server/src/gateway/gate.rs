//! Access-control gates
//!
//! Both gates short-circuit with an HTTP 200 `30 Format Error` response and
//! an empty JSON body. They sit inside the exchange audit layer, so a
//! rejected exchange is still audited.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::response::FORMAT_ERROR_CODE;
use super::GatewayState;
use crate::headers;

/// Backend tier of a route group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tier {
    /// Privileged: mandatory headers are not checked
    #[serde(rename = "core")]
    Core,
    #[default]
    #[serde(rename = "nonCore")]
    NonCore,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::NonCore => "nonCore",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Empty input means the default, non-core
impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Ok(Tier::NonCore),
            t if t.eq_ignore_ascii_case("core") => Ok(Tier::Core),
            t if t.eq_ignore_ascii_case("noncore") || t.eq_ignore_ascii_case("non-core") => {
                Ok(Tier::NonCore)
            },
            other => Err(format!("unknown tier '{other}', expected core or nonCore")),
        }
    }
}

/// Headers a route group requires, and the tier that decides whether they
/// are checked at all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MandatoryHeaders {
    pub headers: Vec<String>,
    pub tier: Tier,
}

impl MandatoryHeaders {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>, tier: Tier) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            tier,
        }
    }
}

/// Exact comparison; an absent header is compared as the empty string
pub fn check_shared_secret(expected: &str, token: &str) -> bool {
    token == expected
}

/// Core tier always passes; otherwise every listed header must be present
/// and non-empty
pub fn check_mandatory_headers(request_headers: &HeaderMap, mandatory: &MandatoryHeaders) -> bool {
    if mandatory.tier == Tier::Core {
        return true;
    }

    mandatory.headers.iter().all(|name| {
        request_headers
            .get(name.as_str())
            .is_some_and(|value| !value.as_bytes().is_empty())
    })
}

/// Rejects requests whose `x-3scale-proxy-secret-token` does not match
pub async fn require_shared_secret(
    State(gateway): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(headers::SHARED_SECRET)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !check_shared_secret(&gateway.shared_secret, token) {
        warn!(
            path = %request.uri().path(),
            token_present = !token.is_empty(),
            "Rejected request with invalid shared secret"
        );
        return gateway.reject();
    }

    next.run(request).await
}

/// Checks mandatory headers for the configured tier and records the tier in
/// request extensions. Core requests get `x-channel-id` stamped on the
/// response.
pub async fn require_mandatory_headers(
    State(gateway): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let tier = gateway.mandatory.tier;
    request.extensions_mut().insert(tier);

    if !check_mandatory_headers(request.headers(), &gateway.mandatory) {
        let missing: Vec<&str> = gateway
            .mandatory
            .headers
            .iter()
            .map(String::as_str)
            .filter(|name| {
                request
                    .headers()
                    .get(*name)
                    .map_or(true, |v| v.as_bytes().is_empty())
            })
            .collect();
        warn!(
            path = %request.uri().path(),
            tier = %tier,
            missing = ?missing,
            "Rejected request missing mandatory headers"
        );
        return gateway.reject();
    }

    debug!(path = %request.uri().path(), tier = %tier, "Mandatory headers accepted");

    let mut response = next.run(request).await;
    if tier == Tier::Core {
        match HeaderValue::from_str(&gateway.core_channel) {
            Ok(channel) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(headers::CHANNEL_ID), channel);
            },
            Err(e) => warn!(error = %e, "Core channel is not a valid header value"),
        }
    }
    response
}

impl GatewayState {
    /// `30 Format Error`, empty body
    pub fn reject(&self) -> Response {
        self.catalog
            .respond(self.domain, FORMAT_ERROR_CODE, serde_json::json!({}))
    }
}
