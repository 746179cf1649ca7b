//! # Logsink Testing
//!
//! Test doubles for the logsink listener.
//!
//! This crate provides:
//! - [`InMemoryBroker`]: a [`MessageSource`] that routes published
//!   messages through the same topic-matching semantics a real topic
//!   exchange applies, so binding behavior is testable without Docker
//! - [`CapturingHandler`]: a [`PayloadHandler`] that records every
//!   invocation and can be told to fail or to run slowly
//!
//! ## Example
//!
//! ```
//! use logsink_testing::{CapturingHandler, InMemoryBroker};
//! use logsink_core::{MessageSource, Payload};
//! use futures::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broker = InMemoryBroker::new();
//! let mut stream = broker.subscribe(&["log.*"]).await.unwrap();
//!
//! broker.publish("log.INFO", Payload::new("log", "hello")).await;
//! broker.publish("audit.INFO", Payload::new("log", "unseen")).await;
//!
//! assert_eq!(stream.next().await.unwrap().data, "hello");
//! # }
//! ```

#![allow(clippy::unwrap_used)]

use logsink_core::{
    BrokerError, HandlerError, MessageSource, Payload, PayloadHandler, PayloadStream,
    TopicPattern,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// One registered subscription: its compiled patterns and the sending
/// half of its delivery channel.
struct Subscription {
    patterns: Vec<TopicPattern>,
    tx: mpsc::UnboundedSender<Payload>,
}

/// An in-memory topic broker.
///
/// `publish` delivers a payload to every subscription with at least one
/// pattern matching the routing key, in subscription order. Dead
/// subscriptions (dropped streams) are pruned on the next publish.
#[derive(Default)]
pub struct InMemoryBroker {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload under a routing key.
    pub async fn publish(&self, routing_key: &str, payload: Payload) {
        self.publish_raw(routing_key, &wire_bytes(&payload)).await;
    }

    /// Publish a raw body under a routing key.
    ///
    /// The body goes through [`Payload::decode`], so malformed input
    /// reaches subscribers as the zero-value payload exactly as it would
    /// from the real consume loop.
    pub async fn publish_raw(&self, routing_key: &str, body: &[u8]) {
        let payload = Payload::decode(body);
        let mut subscriptions = self.subscriptions.lock().await;

        subscriptions.retain(|subscription| {
            let matched = subscription
                .patterns
                .iter()
                .any(|pattern| pattern.matches(routing_key));
            if !matched {
                return true;
            }
            // A closed receiver means the stream was dropped; prune it.
            subscription.tx.send(payload.clone()).is_ok()
        });
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}

impl MessageSource for InMemoryBroker {
    fn subscribe(
        &self,
        patterns: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<PayloadStream, BrokerError>> + Send + '_>> {
        let patterns: Vec<TopicPattern> = patterns
            .iter()
            .map(|pattern| TopicPattern::new(*pattern))
            .collect();

        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscriptions
                .lock()
                .await
                .push(Subscription { patterns, tx });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(payload) = rx.recv().await {
                    yield payload;
                }
            };

            Ok(Box::pin(stream) as PayloadStream)
        })
    }
}

/// Serialize a payload the way a publisher would put it on the wire.
fn wire_bytes(payload: &Payload) -> Vec<u8> {
    // Serializing two string fields cannot fail.
    serde_json::to_vec(payload).unwrap_or_default()
}

/// A [`PayloadHandler`] that records everything it is given.
///
/// By default every invocation succeeds immediately. [`failing`] makes
/// every invocation return the given error; [`with_delay`] makes each
/// invocation sleep first, which is how the concurrency tests create
/// overlapping executions.
///
/// [`failing`]: CapturingHandler::failing
/// [`with_delay`]: CapturingHandler::with_delay
#[derive(Default)]
pub struct CapturingHandler {
    handled: Arc<Mutex<Vec<Payload>>>,
    invocations: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    delay: Option<Duration>,
    fail_with: Option<HandlerError>,
}

impl CapturingHandler {
    /// A handler that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that fails every invocation with `error` (after still
    /// recording the payload).
    #[must_use]
    pub fn failing(error: HandlerError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    /// Sleep for `delay` inside each invocation.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every payload handled so far, in completion order.
    pub async fn handled(&self) -> Vec<Payload> {
        self.handled.lock().await.clone()
    }

    /// Total number of invocations.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The largest number of invocations observed running at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PayloadHandler for CapturingHandler {
    fn handle(
        &self,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        let handled = Arc::clone(&self.handled);
        let invocations = Arc::clone(&self.invocations);
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);
        let delay = self.delay;
        let fail_with = self.fail_with.clone();

        Box::pin(async move {
            let now_running = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now_running, Ordering::SeqCst);

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            handled.lock().await.push(payload);
            invocations.fetch_add(1, Ordering::SeqCst);
            in_flight.fetch_sub(1, Ordering::SeqCst);

            match fail_with {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn broker_routes_by_pattern() {
        let broker = InMemoryBroker::new();
        let mut bound = broker.subscribe(&["log.INFO", "log.WARNING"]).await.unwrap();

        broker.publish("log.INFO", Payload::new("log", "seen")).await;
        broker.publish("log.DEBUG", Payload::new("log", "unseen")).await;
        broker
            .publish("log.WARNING", Payload::new("log", "also seen"))
            .await;

        assert_eq!(bound.next().await.unwrap().data, "seen");
        assert_eq!(bound.next().await.unwrap().data, "also seen");
    }

    #[tokio::test]
    async fn broker_fans_out_to_every_matching_subscription() {
        let broker = InMemoryBroker::new();
        let mut first = broker.subscribe(&["log.#"]).await.unwrap();
        let mut second = broker.subscribe(&["log.ERROR"]).await.unwrap();

        broker.publish("log.ERROR", Payload::new("log", "boom")).await;

        assert_eq!(first.next().await.unwrap().data, "boom");
        assert_eq!(second.next().await.unwrap().data, "boom");
    }

    #[tokio::test]
    async fn broker_prunes_dropped_subscriptions() {
        let broker = InMemoryBroker::new();
        let stream = broker.subscribe(&["log.ERROR"]).await.unwrap();
        assert_eq!(broker.subscription_count().await, 1);

        drop(stream);
        broker.publish("log.ERROR", Payload::new("log", "x")).await;
        assert_eq!(broker.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_raw_bodies_arrive_as_zero_value() {
        let broker = InMemoryBroker::new();
        let mut stream = broker.subscribe(&["#"]).await.unwrap();

        broker.publish_raw("log.ERROR", b"garbage").await;

        assert_eq!(stream.next().await.unwrap(), Payload::default());
    }

    #[tokio::test]
    async fn capturing_handler_records_and_fails_on_demand() {
        let ok = CapturingHandler::new();
        ok.handle(Payload::new("log", "a")).await.unwrap();
        assert_eq!(ok.invocation_count(), 1);
        assert_eq!(ok.handled().await, vec![Payload::new("log", "a")]);

        let failing = CapturingHandler::failing(HandlerError::UnexpectedStatus { status: 500 });
        let result = failing.handle(Payload::new("log", "b")).await;
        assert!(result.is_err());
        assert_eq!(failing.invocation_count(), 1);
    }

    #[test]
    fn wire_bytes_round_trip() {
        let bytes = wire_bytes(&Payload::new("log", r#"say "hi""#));
        assert_eq!(Payload::decode(&bytes), Payload::new("log", r#"say "hi""#));
    }
}
