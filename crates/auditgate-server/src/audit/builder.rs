//! Audit event construction

use chrono::{DateTime, Local};
use serde_json::Value as JsonValue;
use tracing::warn;

use super::context::{AuditContext, CallSite};
use super::event::{AuditEvent, Direction, ErrorEnvelope};
use super::redact::redact_headers;

/// Event timestamp layout: fixed width, zero padded, millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Operation metadata shared by the REQUEST and RESPONSE events of one call
#[derive(Debug, Clone, Copy)]
pub struct EventSpec<'a> {
    pub channel: &'a str,
    pub operation_type: &'a str,
    pub target: &'a str,
}

/// Build an audit event stamped with the current local time.
///
/// A non-empty `error` replaces `payload` with an [`ErrorEnvelope`] carrying
/// the original payload, the call-site hint and the error text.
pub fn build_event(
    ctx: &AuditContext,
    spec: EventSpec<'_>,
    direction: Direction,
    payload: JsonValue,
    error: &str,
    call_site: Option<&CallSite>,
) -> AuditEvent {
    build_event_at(Local::now(), ctx, spec, direction, payload, error, call_site)
}

pub(crate) fn build_event_at(
    now: DateTime<Local>,
    ctx: &AuditContext,
    spec: EventSpec<'_>,
    direction: Direction,
    payload: JsonValue,
    error: &str,
    call_site: Option<&CallSite>,
) -> AuditEvent {
    let headers = match serde_json::to_string(&redact_headers(ctx.headers())) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize audit headers");
            String::new()
        },
    };

    let payload = if error.is_empty() {
        payload
    } else {
        let envelope = ErrorEnvelope {
            payload,
            stack_trace: call_site.map(CallSite::render).unwrap_or_default(),
            exception: error.to_string(),
        };
        envelope_to_value(envelope)
    };

    AuditEvent {
        timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
        correlation_id: ctx.correlation_id().to_string(),
        stan_id: ctx.stan_id().to_string(),
        operation_type: spec.operation_type.to_string(),
        channel: spec.channel.to_string(),
        direction,
        target: spec.target.to_string(),
        headers,
        payload,
    }
}

fn envelope_to_value(envelope: ErrorEnvelope) -> JsonValue {
    let mut object = serde_json::Map::with_capacity(3);
    object.insert("payload".to_string(), envelope.payload);
    object.insert(
        "stack_trace".to_string(),
        JsonValue::String(envelope.stack_trace),
    );
    object.insert("exception".to_string(), JsonValue::String(envelope.exception));
    JsonValue::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use chrono::TimeZone;
    use serde_json::json;

    fn spec() -> EventSpec<'static> {
        EventSpec {
            channel: "ledger",
            operation_type: "GET",
            target: "postgres://db/ledger",
        }
    }

    fn ctx() -> AuditContext {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("corr-1"));
        headers.insert("x-stan-id", HeaderValue::from_static("stan-1"));
        headers.insert("x-api-key", HeaderValue::from_static("abcdefgh"));
        AuditContext::new(headers)
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let now = Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 2).unwrap();
        let event = build_event_at(now, &ctx(), spec(), Direction::Request, json!({}), "", None);
        assert_eq!(event.timestamp(), "2024-03-01 09:05:02.000");
    }

    #[test]
    fn test_copies_ids_and_redacts_headers() {
        let event = build_event(&ctx(), spec(), Direction::Request, json!({"id": 7}), "", None);

        assert_eq!(event.correlation_id(), "corr-1");
        assert_eq!(event.stan_id(), "stan-1");
        assert_eq!(event.operation_type(), "GET");
        assert_eq!(event.channel(), "ledger");
        assert_eq!(event.target(), "postgres://db/ledger");
        assert_eq!(event.payload(), &json!({"id": 7}));

        let headers: JsonValue = serde_json::from_str(event.headers()).unwrap();
        assert_eq!(headers["x-api-key"], json!(["ab***********fgh"]));
        assert_eq!(headers["x-correlation-id"], json!(["corr-1"]));
    }

    #[test]
    fn test_error_wraps_payload() {
        let site = CallSite::here("AuditedStore::get");
        let event = build_event(
            &ctx(),
            spec(),
            Direction::Response,
            json!({"id": 7}),
            "record not found",
            Some(&site),
        );

        assert_eq!(event.payload()["payload"], json!({"id": 7}));
        assert_eq!(event.payload()["exception"], "record not found");
        assert_eq!(event.payload()["stack_trace"], site.render());
    }

    #[test]
    fn test_error_without_call_site_has_empty_hint() {
        let event = build_event(&ctx(), spec(), Direction::Response, json!(1), "boom", None);
        assert_eq!(event.payload()["stack_trace"], "");
    }

    #[test]
    fn test_empty_error_keeps_bare_payload() {
        let site = CallSite::here("caller");
        let event = build_event(&ctx(), spec(), Direction::Response, json!([1, 2]), "", Some(&site));
        assert_eq!(event.payload(), &json!([1, 2]));
    }
}
