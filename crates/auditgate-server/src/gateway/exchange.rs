//! Inbound exchange auditing
//!
//! Outermost layer of the gated API: emits a REQUEST event with the parsed
//! request body, runs the rest of the stack, buffers the response body and
//! emits a RESPONSE event with it. Any `x-api-key` header is removed from
//! the outgoing response.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, Request},
    http::{header, HeaderMap, Uri},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Map, Value as JsonValue};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::GatewayState;
use crate::audit::{AuditContext, Operation};
use crate::headers;

/// Wraps the gated API so every exchange is audited
#[derive(Clone)]
pub struct ExchangeAuditLayer {
    gateway: Arc<GatewayState>,
}

impl ExchangeAuditLayer {
    pub fn new(gateway: Arc<GatewayState>) -> Self {
        Self { gateway }
    }
}

impl<S> Layer<S> for ExchangeAuditLayer {
    type Service = ExchangeAuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExchangeAuditMiddleware {
            inner,
            gateway: Arc::clone(&self.gateway),
        }
    }
}

#[derive(Clone)]
pub struct ExchangeAuditMiddleware<S> {
    inner: S,
    gateway: Arc<GatewayState>,
}

impl<S> Service<Request> for ExchangeAuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gateway = Arc::clone(&self.gateway);

        Box::pin(async move {
            let ctx = AuditContext::from_headers(request.headers());
            let channel = ctx.header(headers::CHANNEL_ID).to_string();
            let path = original_uri(&request).path().to_string();
            let target = exchange_target(&request);

            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, gateway.max_body_bytes).await;
            let input = match &body {
                Ok(bytes) => {
                    debug!(path = %path, body_size = bytes.len(), "Captured request body");
                    request_payload(&parts.headers, bytes)
                },
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to read request body");
                    JsonValue::String(String::new())
                },
            };

            let publisher = gateway.publisher.clone();
            let operation =
                Operation::new(channel, path, target).caller("ExchangeAuditMiddleware::call");

            let exchange = operation
                .run(
                    &publisher,
                    &ctx,
                    input,
                    || async move {
                        let response = match body {
                            Ok(bytes) => {
                                inner
                                    .call(Request::from_parts(parts, Body::from(bytes)))
                                    .await?
                            },
                            Err(_) => gateway.reject(),
                        };
                        Ok::<_, S::Error>(buffer_response(response).await)
                    },
                    |buffered| buffered.payload.clone(),
                )
                .await?;

            Ok(exchange.response)
        })
    }
}

struct BufferedResponse {
    response: Response,
    payload: JsonValue,
}

async fn buffer_response(response: Response) -> BufferedResponse {
    let (mut parts, body) = response.into_parts();
    parts.headers.remove(headers::API_KEY);

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to buffer response body");
            Bytes::new()
        },
    };

    BufferedResponse {
        payload: response_payload(&bytes),
        response: Response::from_parts(parts, Body::from(bytes)),
    }
}

/// URI as received, before any `Router::nest` prefix stripping
fn original_uri(request: &Request) -> &Uri {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or_else(|| request.uri())
}

/// `host + path + "?" + query`; the `?` is present even without a query
pub fn exchange_target(request: &Request) -> String {
    let uri = original_uri(request);
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();

    format!("{}{}?{}", host, uri.path(), uri.query().unwrap_or_default())
}

/// JSON body, else a form map of `{name: [values]}` for urlencoded bodies,
/// else the empty string
pub fn request_payload(request_headers: &HeaderMap, body: &[u8]) -> JsonValue {
    if let Ok(value) = serde_json::from_slice::<JsonValue>(body) {
        return value;
    }

    let is_form = request_headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let mut form: Map<String, JsonValue> = Map::new();
        for (key, value) in url::form_urlencoded::parse(body) {
            let entry = form
                .entry(key.into_owned())
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            if let JsonValue::Array(values) = entry {
                values.push(JsonValue::String(value.into_owned()));
            }
        }
        return JsonValue::Object(form);
    }

    JsonValue::String(String::new())
}

/// JSON body, else the body as text
pub fn response_payload(body: &[u8]) -> JsonValue {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(body).into_owned()))
}
