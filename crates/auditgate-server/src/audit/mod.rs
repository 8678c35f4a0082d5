//! Audit pipeline
//!
//! Events are built synchronously on the calling path and handed to an
//! [`AuditPublisher`], which delivers them to a [`Transport`] in the
//! background. Delivery is best-effort: failures are logged, never retried
//! and never surfaced to the audited caller.

mod builder;
mod context;
mod error;
mod event;
mod operation;
mod publisher;
pub mod redact;
mod transport;

pub use builder::{build_event, EventSpec, TIMESTAMP_FORMAT};
pub use context::{AuditContext, CallSite};
pub use error::PublishError;
pub use event::{AuditEvent, Direction, ErrorEnvelope};
pub use operation::Operation;
pub use publisher::{
    deliver, AuditPublisher, PublisherHandle, PublisherSettings, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_PUBLISH_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_TOPIC,
};
pub use transport::{
    MemoryTransport, PublishedMessage, RestProxyTransport, TracingTransport, Transport,
    KAFKA_JSON_CONTENT_TYPE,
};
