//! Audit event wire model
//!
//! Field names on the wire are fixed by downstream consumers of the audit
//! topic, so the serde renames here must not change.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Whether an event records the start or the end of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "REQUEST",
            Direction::Response => "RESPONSE",
        }
    }

    /// Wire representation: `"true"` for requests, `"false"` for responses
    fn wire_flag(self) -> &'static str {
        match self {
            Direction::Request => "true",
            Direction::Response => "false",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_flag())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flag = String::deserialize(deserializer)?;
        match flag.as_str() {
            "true" => Ok(Direction::Request),
            "false" => Ok(Direction::Response),
            other => Err(serde::de::Error::custom(format!(
                "invalid isRequest flag '{other}', expected \"true\" or \"false\""
            ))),
        }
    }
}

/// Payload recorded on the RESPONSE event of a failed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub payload: JsonValue,
    pub stack_trace: String,
    pub exception: String,
}

/// One audit record. Built by [`super::build_event`], read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "date")]
    pub(crate) timestamp: String,
    #[serde(rename = "X-Correlation-Id")]
    pub(crate) correlation_id: String,
    #[serde(rename = "X-Stan-Id")]
    pub(crate) stan_id: String,
    #[serde(rename = "trxType")]
    pub(crate) operation_type: String,
    pub(crate) channel: String,
    #[serde(rename = "isRequest")]
    pub(crate) direction: Direction,
    #[serde(rename = "url")]
    pub(crate) target: String,
    pub(crate) headers: String,
    pub(crate) payload: JsonValue,
}

impl AuditEvent {
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn stan_id(&self) -> &str {
        &self.stan_id
    }

    pub fn operation_type(&self) -> &str {
        &self.operation_type
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Redacted headers as JSON text, empty if they could not be serialized
    pub fn headers(&self) -> &str {
        &self.headers
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    /// The error envelope, if this event records a failure
    pub fn error(&self) -> Option<ErrorEnvelope> {
        if self.direction != Direction::Response {
            return None;
        }
        let object = self.payload.as_object()?;
        if !(object.contains_key("exception") && object.contains_key("stack_trace")) {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(direction: Direction, payload: JsonValue) -> AuditEvent {
        AuditEvent {
            timestamp: "2024-03-01 09:15:02.007".to_string(),
            correlation_id: "corr-1".to_string(),
            stan_id: "stan-1".to_string(),
            operation_type: "SAVE".to_string(),
            channel: "ledger".to_string(),
            direction,
            target: "postgres://db/ledger".to_string(),
            headers: "{}".to_string(),
            payload,
        }
    }

    #[test]
    fn test_wire_keys() {
        let event = sample(Direction::Request, json!({"a": 1}));
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["date"], "2024-03-01 09:15:02.007");
        assert_eq!(wire["X-Correlation-Id"], "corr-1");
        assert_eq!(wire["X-Stan-Id"], "stan-1");
        assert_eq!(wire["trxType"], "SAVE");
        assert_eq!(wire["channel"], "ledger");
        assert_eq!(wire["isRequest"], "true");
        assert_eq!(wire["url"], "postgres://db/ledger");
        assert_eq!(wire["headers"], "{}");
        assert_eq!(wire["payload"], json!({"a": 1}));
    }

    #[test]
    fn test_response_flag_is_false_string() {
        let event = sample(Direction::Response, JsonValue::Null);
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["isRequest"], "false");

        let parsed: AuditEvent = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.direction(), Direction::Response);
    }

    #[test]
    fn test_rejects_unknown_flag() {
        let mut wire = serde_json::to_value(sample(Direction::Request, JsonValue::Null)).unwrap();
        wire["isRequest"] = json!("maybe");
        assert!(serde_json::from_value::<AuditEvent>(wire).is_err());
    }

    #[test]
    fn test_error_envelope_only_on_failed_response() {
        let envelope = json!({
            "payload": {"id": 1},
            "stack_trace": "src/store.rs#10: get",
            "exception": "not found",
        });

        let failed = sample(Direction::Response, envelope.clone());
        let error = failed.error().unwrap();
        assert_eq!(error.exception, "not found");
        assert_eq!(error.payload, json!({"id": 1}));

        assert!(sample(Direction::Request, envelope).error().is_none());
        assert!(sample(Direction::Response, json!({"id": 1})).error().is_none());
    }
}
