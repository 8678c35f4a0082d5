//! Audit transports
//!
//! A transport delivers one serialized event to the broker. Implementations
//! are shared between concurrent deliveries and must be `Send + Sync`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use super::error::PublishError;
use super::event::AuditEvent;

/// Content type understood by the Kafka REST proxy for JSON records
pub const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver `bytes` to `topic`, partitioned by `key`
    async fn publish(&self, key: &str, topic: &str, bytes: Vec<u8>) -> Result<(), PublishError>;

    /// Short name used in diagnostics
    fn name(&self) -> &'static str;
}

/// Produces records through a Kafka REST proxy (`POST /topics/{topic}`)
#[derive(Debug, Clone)]
pub struct RestProxyTransport {
    client: reqwest::Client,
    base_url: String,
}

impl RestProxyTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("auditgate/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for RestProxyTransport {
    async fn publish(&self, key: &str, topic: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        let value: JsonValue = serde_json::from_slice(&bytes)?;
        let body = json!({
            "records": [{ "key": key, "value": value }]
        });

        let url = format!("{}/topics/{}", self.base_url, topic);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, KAFKA_JSON_CONTENT_TYPE)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(topic = %topic, key = %key, "Audit record accepted by broker");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "rest-proxy"
    }
}

/// Writes events to the `audit` tracing target; used when no broker is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTransport;

#[async_trait]
impl Transport for TracingTransport {
    async fn publish(&self, key: &str, topic: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        let event = String::from_utf8_lossy(&bytes);
        info!(target: "audit", topic = %topic, key = %key, event = %event, "audit event");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// A message captured by [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub key: String,
    pub topic: String,
    pub bytes: Vec<u8>,
}

impl PublishedMessage {
    pub fn event(&self) -> Result<AuditEvent, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }
}

/// In-process transport that records every delivery
///
/// Clones share the same buffer. Failure injection makes every publish
/// return [`PublishError::Unavailable`] without recording the message.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    messages: Arc<Mutex<Vec<PublishedMessage>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.lock().clone()
    }

    /// Decoded events in delivery order; undecodable messages are skipped
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter_map(|message| message.event().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll until at least `count` messages arrived or `timeout` elapsed,
    /// then return the decoded events seen so far.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<AuditEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.events()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PublishedMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, key: &str, topic: &str, bytes: Vec<u8>) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable(
                "memory transport set to fail".to_string(),
            ));
        }

        self.lock().push(PublishedMessage {
            key: key.to_string(),
            topic: topic.to_string(),
            bytes,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_records_messages() {
        let transport = MemoryTransport::new();
        transport
            .publish("corr-1", "audit", b"{\"a\":1}".to_vec())
            .await
            .unwrap();

        let messages = transport.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "corr-1");
        assert_eq!(messages[0].topic, "audit");
    }

    #[tokio::test]
    async fn test_memory_transport_failure_injection() {
        let transport = MemoryTransport::failing();
        let result = transport.publish("k", "audit", b"{}".to_vec()).await;

        assert!(matches!(result, Err(PublishError::Unavailable(_))));
        assert!(transport.is_empty());

        transport.set_failing(false);
        transport.publish("k", "audit", b"{}".to_vec()).await.unwrap();
        assert_eq!(transport.len(), 1);
    }

    #[tokio::test]
    async fn test_tracing_transport_accepts_everything() {
        assert!(TracingTransport
            .publish("k", "audit", b"not json".to_vec())
            .await
            .is_ok());
    }

    #[test]
    fn test_rest_proxy_trims_trailing_slash() {
        let transport =
            RestProxyTransport::new("http://proxy:8082/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(), "http://proxy:8082");
    }
}
