//! Exchange, queue, and binding declarations.
//!
//! The listener side of the topology is small: one durable topic exchange
//! shared with the publishing services, and one exclusive server-named
//! queue per subscription. Declarations are idempotent as long as the
//! properties match what already exists on the broker; a mismatch is a
//! hard error surfaced to the caller.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind, Queue};
use logsink_core::BrokerError;

/// Name of the topic exchange every log publisher and listener shares.
pub const LOGS_EXCHANGE: &str = "logs_topic";

/// Declare the durable `logs_topic` topic exchange on `channel`.
///
/// Safe to call once per channel at startup; this service and its
/// publishing counterparts all declare the same exchange with the same
/// properties, and the broker treats identical redeclaration as a no-op.
///
/// # Errors
///
/// Returns [`BrokerError::Topology`] when the declaration is rejected,
/// e.g. an exchange of the same name already exists with different
/// properties.
pub async fn declare_exchange(channel: &Channel) -> Result<(), BrokerError> {
    channel
        .exchange_declare(
            LOGS_EXCHANGE,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                auto_delete: false,
                internal: false,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|error| BrokerError::Topology(error.to_string()))
}

/// Declare a fresh exclusive, non-durable, server-named queue.
///
/// Each call yields a distinct queue scoped to the channel's connection;
/// the broker deletes it when that connection closes. No two listener
/// instances ever share a queue.
///
/// # Errors
///
/// Returns [`BrokerError::Topology`] when the declaration is rejected.
pub async fn declare_queue(channel: &Channel) -> Result<Queue, BrokerError> {
    channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                durable: false,
                exclusive: true,
                auto_delete: false,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|error| BrokerError::Topology(error.to_string()))
}

/// Bind `queue` to the logs exchange, one binding per pattern.
///
/// Bindings are attempted in input order. The first failure aborts and is
/// returned; bindings already established are left in place — the broker
/// drops them with the exclusive queue when the connection closes, so
/// there is no rollback here.
///
/// # Errors
///
/// Returns [`BrokerError::Binding`] naming the pattern whose bind was
/// rejected.
pub async fn bind_queue<S: AsRef<str>>(
    channel: &Channel,
    queue: &str,
    patterns: &[S],
) -> Result<(), BrokerError> {
    for pattern in patterns {
        let pattern = pattern.as_ref();
        channel
            .queue_bind(
                queue,
                LOGS_EXCHANGE,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|error| BrokerError::Binding {
                pattern: pattern.to_string(),
                reason: error.to_string(),
            })?;

        tracing::debug!(queue, pattern, exchange = LOGS_EXCHANGE, "Bound pattern");
    }

    Ok(())
}
