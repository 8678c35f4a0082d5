//! Per-request audit context and call-site capture

use std::convert::Infallible;
use std::panic::Location;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::headers;

/// Request-scoped data copied into every audit event of one exchange.
///
/// Holds its own copy of the inbound headers; handlers extract it with
/// `ctx: AuditContext` like any other axum extractor.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    headers: HeaderMap,
}

impl AuditContext {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::new(headers.clone())
    }

    /// Header value as text; empty when absent or not valid UTF-8
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn correlation_id(&self) -> &str {
        self.header(headers::CORRELATION_ID)
    }

    pub fn stan_id(&self) -> &str {
        self.header(headers::STAN_ID)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Source location of an audited call, rendered as `"<file>#<line>: <caller>"`
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    location: &'static Location<'static>,
    caller: &'static str,
}

impl CallSite {
    #[track_caller]
    pub fn here(caller: &'static str) -> Self {
        Self {
            location: Location::caller(),
            caller,
        }
    }

    pub fn with_caller(self, caller: &'static str) -> Self {
        Self { caller, ..self }
    }

    pub fn file(&self) -> &'static str {
        self.location.file()
    }

    pub fn line(&self) -> u32 {
        self.location.line()
    }

    pub fn render(&self) -> String {
        format!("{}#{}: {}", self.file(), self.line(), self.caller)
    }
}
