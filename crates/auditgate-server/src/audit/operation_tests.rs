//! Tests for the audited operation wrapper

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use serde_json::json;

use super::*;
use crate::audit::{MemoryTransport, PublisherHandle, PublisherSettings};

fn ctx() -> AuditContext {
    let mut headers = HeaderMap::new();
    headers.insert("x-correlation-id", HeaderValue::from_static("corr-42"));
    headers.insert("x-stan-id", HeaderValue::from_static("stan-42"));
    AuditContext::new(headers)
}

fn publisher(transport: &MemoryTransport) -> (AuditPublisher, PublisherHandle) {
    AuditPublisher::spawn(Arc::new(transport.clone()), PublisherSettings::default())
}

async fn finish(publisher: AuditPublisher, handle: PublisherHandle) {
    drop(publisher);
    handle.drain(Duration::from_secs(5)).await;
}

#[derive(Debug, PartialEq)]
struct Boom;

impl Display for Boom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("boom")
    }
}

#[tokio::test]
async fn test_success_emits_request_then_response() {
    let transport = MemoryTransport::new();
    let (publisher, handle) = publisher(&transport);

    let op = Operation::new("ledger", "SAVE", "postgres://db/ledger");
    let result: Result<u32, Boom> = op
        .run(
            &publisher,
            &ctx(),
            json!({"in": 1}),
            || async { Ok(7) },
            |v| json!({"out": v}),
        )
        .await;

    assert_eq!(result, Ok(7));
    finish(publisher, handle).await;

    let events = transport.events();
    assert_eq!(events.len(), 2);

    let request = events
        .iter()
        .find(|e| e.direction() == Direction::Request)
        .unwrap();
    let response = events
        .iter()
        .find(|e| e.direction() == Direction::Response)
        .unwrap();

    assert_eq!(request.payload(), &json!({"in": 1}));
    assert_eq!(response.payload(), &json!({"out": 7}));
    assert!(response.error().is_none());

    for event in &events {
        assert_eq!(event.correlation_id(), "corr-42");
        assert_eq!(event.stan_id(), "stan-42");
        assert_eq!(event.operation_type(), "SAVE");
        assert_eq!(event.channel(), "ledger");
        assert_eq!(event.target(), "postgres://db/ledger");
    }
}

#[tokio::test]
async fn test_request_is_queued_before_action_runs() {
    // Undrained channel: the action can see exactly what was queued before it ran.
    let (sender, mut receiver) = tokio::sync::mpsc::channel(4);
    let publisher = AuditPublisher::from_sender(sender);

    let op = Operation::new("ledger", "GET", "db");
    let seen_before_action = op
        .run(
            &publisher,
            &ctx(),
            json!(null),
            move || async move {
                let first = receiver.try_recv().ok().map(|e| e.direction());
                let second = receiver.try_recv().ok().map(|e| e.direction());
                Ok::<_, Boom>((first, second))
            },
            |_| json!(null),
        )
        .await
        .unwrap();

    assert_eq!(seen_before_action, (Some(Direction::Request), None));
}

#[tokio::test]
async fn test_failure_wraps_input_with_error() {
    let transport = MemoryTransport::new();
    let (publisher, handle) = publisher(&transport);

    let op = Operation::new("ledger", "GET", "db").caller("lookup");
    let expected_line = line!() - 1;
    let result: Result<(), Boom> = op
        .run(
            &publisher,
            &ctx(),
            json!({"id": "abc"}),
            || async { Err(Boom) },
            |_| json!("unused"),
        )
        .await;

    assert_eq!(result, Err(Boom));
    finish(publisher, handle).await;

    let response = transport
        .events()
        .into_iter()
        .find(|e| e.direction() == Direction::Response)
        .unwrap();
    let error = response.error().unwrap();

    assert_eq!(error.payload, json!({"id": "abc"}));
    assert_eq!(error.exception, "boom");
    assert!(error.stack_trace.ends_with(&format!("#{expected_line}: lookup")));
    assert!(error.stack_trace.contains("operation_tests.rs"));
}

#[tokio::test]
async fn test_empty_error_text_still_marks_failure() {
    struct Silent;
    impl Display for Silent {
        fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            Ok(())
        }
    }

    let transport = MemoryTransport::new();
    let (publisher, handle) = publisher(&transport);

    let result: Result<(), Silent> = Operation::new("c", "QUERY", "t")
        .run(&publisher, &ctx(), json!(1), || async { Err(Silent) }, |_| json!(0))
        .await;
    assert!(result.is_err());
    finish(publisher, handle).await;

    let response = transport
        .events()
        .into_iter()
        .find(|e| e.direction() == Direction::Response)
        .unwrap();
    assert!(response.error().unwrap().exception.contains("Silent"));
}

#[tokio::test]
async fn test_publish_failure_does_not_change_result() {
    let transport = MemoryTransport::failing();
    let (publisher, handle) = publisher(&transport);
    let op = Operation::new("ledger", "SAVE", "db");

    let ok: Result<&str, Boom> = op
        .run(&publisher, &ctx(), json!(1), || async { Ok("done") }, |_| json!(1))
        .await;
    let err: Result<&str, Boom> = op
        .run(&publisher, &ctx(), json!(1), || async { Err(Boom) }, |_| json!(1))
        .await;

    assert_eq!(ok, Ok("done"));
    assert_eq!(err, Err(Boom));
    finish(publisher, handle).await;
    assert!(transport.is_empty());
}

#[tokio::test]
async fn test_closed_publisher_does_not_change_result() {
    let (sender, receiver) = tokio::sync::mpsc::channel(1);
    drop(receiver);
    let publisher = AuditPublisher::from_sender(sender);

    let result: Result<i32, Boom> = Operation::new("c", "GET", "t")
        .run(&publisher, &ctx(), json!(1), || async { Ok(5) }, |_| json!(5))
        .await;
    assert_eq!(result, Ok(5));
}
