//! Audited operation wrapper
//!
//! Every data operation, outbound call and inbound exchange goes through
//! [`Operation::run`]: publish REQUEST, run the action, publish RESPONSE,
//! return the action's result untouched.

use std::fmt::Display;
use std::future::Future;

use serde_json::Value as JsonValue;

use super::builder::{build_event, EventSpec};
use super::context::{AuditContext, CallSite};
use super::event::{AuditEvent, Direction};
use super::publisher::AuditPublisher;

/// Metadata for one audited call
#[derive(Debug, Clone)]
pub struct Operation {
    channel: String,
    name: String,
    target: String,
    call_site: CallSite,
}

impl Operation {
    /// Describe an operation; the caller's source location becomes the
    /// stack hint of a failed RESPONSE.
    #[track_caller]
    pub fn new(
        channel: impl Into<String>,
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            name: name.into(),
            target: target.into(),
            call_site: CallSite::here(""),
        }
    }

    /// Name the calling function in the stack hint
    pub fn caller(mut self, caller: &'static str) -> Self {
        self.call_site = self.call_site.with_caller(caller);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn call_site(&self) -> &CallSite {
        &self.call_site
    }

    pub fn request_event(&self, ctx: &AuditContext, payload: JsonValue) -> AuditEvent {
        build_event(ctx, self.spec(), Direction::Request, payload, "", None)
    }

    /// RESPONSE event; a non-empty `error` wraps `payload` with the stack hint
    pub fn response_event(&self, ctx: &AuditContext, payload: JsonValue, error: &str) -> AuditEvent {
        build_event(
            ctx,
            self.spec(),
            Direction::Response,
            payload,
            error,
            Some(&self.call_site),
        )
    }

    /// Run `action` between a REQUEST and a RESPONSE event.
    ///
    /// On success the RESPONSE payload is `extract(&value)`. On failure it is
    /// `input` wrapped with the error text. Publishing never affects the
    /// returned value.
    pub async fn run<T, E, F, Fut, X>(
        &self,
        publisher: &AuditPublisher,
        ctx: &AuditContext,
        input: JsonValue,
        action: F,
        extract: X,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        X: FnOnce(&T) -> JsonValue,
    {
        publisher.publish(self.request_event(ctx, input.clone()));

        let outcome = action().await;

        let response = match &outcome {
            Ok(value) => self.response_event(ctx, extract(value), ""),
            Err(e) => self.response_event(ctx, input, &error_text(e)),
        };
        publisher.publish(response);

        outcome
    }

    fn spec(&self) -> EventSpec<'_> {
        EventSpec {
            channel: &self.channel,
            operation_type: &self.name,
            target: &self.target,
        }
    }
}

/// Error text for the envelope; never empty so failures stay recognizable
fn error_text<E: Display>(error: &E) -> String {
    let text = error.to_string();
    if text.is_empty() {
        std::any::type_name::<E>().to_string()
    } else {
        text
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
