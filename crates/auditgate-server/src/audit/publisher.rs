//! Asynchronous audit publisher
//!
//! `publish` never blocks: events go into a bounded queue and a dispatcher
//! task routes them by correlation ID to `max_in_flight` delivery shards.
//! Each shard delivers sequentially, so the events of one operation reach
//! the transport in the order they were published. When the queue is full
//! the event is dropped with a warning. Delivery errors are logged and
//! swallowed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::error::PublishError;
use super::event::AuditEvent;
use super::transport::Transport;

/// Default topic for audit events
pub const DEFAULT_TOPIC: &str = "gateway-audit";

/// Default number of events buffered before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of delivery shards, each delivering one event at a time
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Default per-delivery timeout
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub topic: String,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub publish_timeout: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Cheap, cloneable handle for enqueueing audit events
#[derive(Debug, Clone)]
pub struct AuditPublisher {
    sender: mpsc::Sender<AuditEvent>,
}

/// Owns the dispatcher task; await [`PublisherHandle::drain`] on shutdown
#[derive(Debug)]
pub struct PublisherHandle {
    task: JoinHandle<()>,
}

impl AuditPublisher {
    /// Start a dispatcher on the current tokio runtime.
    ///
    /// The dispatcher exits once every `AuditPublisher` clone is dropped and
    /// all queued and in-flight deliveries have finished.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        settings: PublisherSettings,
    ) -> (Self, PublisherHandle) {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));

        debug!(
            transport = transport.name(),
            topic = %settings.topic,
            queue_capacity = settings.queue_capacity,
            max_in_flight = settings.max_in_flight,
            "Starting audit publisher"
        );

        let task = tokio::spawn(dispatch(receiver, transport, settings));
        (Self { sender }, PublisherHandle { task })
    }

    /// Enqueue an event, logging instead of failing when it cannot be queued
    pub fn publish(&self, event: AuditEvent) {
        let correlation_id = event.correlation_id().to_string();
        let trx_type = event.operation_type().to_string();
        let direction = event.direction();

        match self.try_publish(event) {
            Ok(()) => trace!(
                correlation_id = %correlation_id,
                trx_type = %trx_type,
                direction = %direction,
                "Audit event queued"
            ),
            Err(e) => warn!(
                correlation_id = %correlation_id,
                trx_type = %trx_type,
                direction = %direction,
                error = %e,
                "Dropping audit event"
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_sender(sender: mpsc::Sender<AuditEvent>) -> Self {
        Self { sender }
    }

    /// Enqueue an event without waiting for queue space
    pub fn try_publish(&self, event: AuditEvent) -> Result<(), PublishError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::QueueFull,
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

impl PublisherHandle {
    /// Wait for the dispatcher to finish, giving up after `timeout`
    pub async fn drain(self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => debug!("Audit publisher drained"),
            Ok(Err(e)) => error!(error = %e, "Audit publisher task failed"),
            Err(_) => warn!(
                timeout_secs = timeout.as_secs(),
                "Audit publisher did not drain before timeout"
            ),
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<AuditEvent>,
    transport: Arc<dyn Transport>,
    settings: PublisherSettings,
) {
    let shards = settings.max_in_flight.max(1);
    let shard_capacity = (settings.queue_capacity / shards).max(1);
    let topic: Arc<str> = Arc::from(settings.topic.as_str());

    let mut senders = Vec::with_capacity(shards);
    let mut workers = Vec::with_capacity(shards);
    for shard in 0..shards {
        let (sender, shard_receiver) = mpsc::channel(shard_capacity);
        senders.push(sender);
        workers.push(tokio::spawn(deliver_shard(
            shard,
            shard_receiver,
            Arc::clone(&transport),
            Arc::clone(&topic),
            settings.publish_timeout,
        )));
    }

    while let Some(event) = receiver.recv().await {
        let shard = shard_for(event.correlation_id(), shards);
        if let Err(e) = senders[shard].send(event).await {
            error!(
                shard,
                correlation_id = %e.0.correlation_id(),
                "Audit delivery shard stopped, dropping event"
            );
        }
    }

    // Closing the shard queues lets every worker finish its backlog.
    drop(senders);
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Audit delivery shard failed");
        }
    }
}

/// Events sharing a key always land on the same shard
fn shard_for(key: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let shards = u64::try_from(shards).unwrap_or(u64::MAX).max(1);
    usize::try_from(hasher.finish() % shards).unwrap_or_default()
}

/// Delivers one shard's events strictly in queue order
async fn deliver_shard(
    shard: usize,
    mut receiver: mpsc::Receiver<AuditEvent>,
    transport: Arc<dyn Transport>,
    topic: Arc<str>,
    timeout: Duration,
) {
    while let Some(event) = receiver.recv().await {
        if let Err(e) = deliver(transport.as_ref(), &topic, &event, timeout).await {
            error!(
                transport = transport.name(),
                shard,
                topic = %topic,
                correlation_id = %event.correlation_id(),
                trx_type = %event.operation_type(),
                direction = %event.direction(),
                error = %e,
                "Failed to publish audit event"
            );
        }
    }
}

/// Serialize one event and hand it to the transport
pub async fn deliver(
    transport: &dyn Transport,
    topic: &str,
    event: &AuditEvent,
    timeout: Duration,
) -> Result<(), PublishError> {
    let bytes = serde_json::to_vec(event)?;
    tokio::time::timeout(timeout, transport.publish(event.correlation_id(), topic, bytes))
        .await
        .map_err(|_| PublishError::Timeout(timeout))?
}
