//! Broker subscription seam.
//!
//! [`MessageSource`] is the boundary between the listener and whatever
//! delivers messages to it: the lapin-backed AMQP implementation in
//! production, an in-memory broker in tests. A source hands back a
//! [`PayloadStream`] — a lazy, unbounded sequence of decoded payloads that
//! ends only when the underlying transport dies and is not restartable.

use crate::payload::Payload;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while bringing a subscription up.
///
/// All of these are setup-phase failures: they are fatal, propagate to the
/// caller, and abort the process. Steady-state per-message problems never
/// surface here (malformed bodies decode to the zero-value payload,
/// handler failures are contained by the dispatcher).
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// The broker stayed unreachable through the whole retry schedule.
    #[error("connection failed after {attempts} attempts: {reason}")]
    Connection {
        /// How many dial attempts were made before giving up.
        attempts: u64,
        /// The last dial error.
        reason: String,
    },

    /// Exchange or queue declaration failed, e.g. a property mismatch
    /// against an already-declared exchange.
    #[error("topology declaration failed: {0}")]
    Topology(String),

    /// A routing-key binding failed. Bindings established before the
    /// failing pattern stay in place.
    #[error("binding failed for pattern '{pattern}': {reason}")]
    Binding {
        /// The pattern whose bind was rejected.
        pattern: String,
        /// The reason for failure.
        reason: String,
    },

    /// Registering the consumer on the bound queue failed.
    #[error("consume registration failed: {0}")]
    Consume(String),
}

/// Stream of decoded payloads from a subscription.
///
/// Delivery order from the broker is preserved into this stream; what
/// happens after dispatch is unordered.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Payload> + Send>>;

/// A source of broker messages.
///
/// Implementations declare whatever topology they need, bind the given
/// routing-key patterns in input order, and return the live stream.
/// Each call yields an independent subscription with its own queue.
pub trait MessageSource: Send + Sync {
    /// Subscribe to messages matching `patterns`.
    ///
    /// Patterns follow topic-exchange syntax: dot-separated segments,
    /// `*` matching exactly one segment and `#` matching zero or more.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the queue cannot be declared, a
    /// pattern cannot be bound, or the consumer cannot be registered.
    fn subscribe(
        &self,
        patterns: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<PayloadStream, BrokerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_error_messages_name_the_failure() {
        let err = BrokerError::Connection {
            attempts: 6,
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection failed after 6 attempts: connection refused"
        );

        let err = BrokerError::Binding {
            pattern: "log.*".to_string(),
            reason: "access refused".to_string(),
        };
        assert!(err.to_string().contains("log.*"));
    }

    #[test]
    fn message_source_is_object_safe() {
        fn assert_object_safe(_: &dyn MessageSource) {}
        let _ = assert_object_safe;
    }
}
