//! The lapin-backed [`MessageSource`] implementation.

use crate::connect::{self, ReconnectPolicy};
use crate::topology;
use futures::StreamExt;
use lapin::Connection;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use logsink_core::{BrokerError, MessageSource, Payload, PayloadStream};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

/// A live listener connection to the broker.
///
/// Construction dials the broker through the retry schedule and declares
/// the shared topic exchange on a setup channel. Each
/// [`subscribe`](MessageSource::subscribe) call then opens its own
/// channel, declares its own exclusive queue, binds the requested
/// patterns, and returns the consume stream.
///
/// The connection is owned exclusively by this value and released when it
/// drops; the broker deletes every exclusive queue scoped to it at that
/// point.
pub struct AmqpListener {
    connection: Connection,
    buffer_size: usize,
}

impl AmqpListener {
    /// Default capacity of the delivery buffer between the consume task
    /// and the subscriber.
    pub const DEFAULT_BUFFER_SIZE: usize = 1000;

    /// Dial the broker and declare the logs exchange.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Connection`] when the retry schedule is
    /// exhausted and [`BrokerError::Topology`] when the exchange cannot
    /// be declared.
    pub async fn connect(url: &str, policy: ReconnectPolicy) -> Result<Self, BrokerError> {
        let connection = connect::connect(url, &policy).await?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|error| BrokerError::Topology(error.to_string()))?;
        topology::declare_exchange(&channel).await?;

        Ok(Self {
            connection,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        })
    }

    /// Set the delivery buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is 0.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be greater than 0");
        self.buffer_size = buffer_size;
        self
    }

    /// Close the connection deterministically.
    ///
    /// Dropping the listener releases the connection too; this exists so
    /// shutdown paths can close it before the process exits and log the
    /// outcome.
    pub async fn close(self) {
        if let Err(error) = self.connection.close(200, "shutting down").await {
            tracing::warn!(%error, "Broker connection did not close cleanly");
        }
    }
}

impl MessageSource for AmqpListener {
    fn subscribe(
        &self,
        patterns: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<PayloadStream, BrokerError>> + Send + '_>> {
        let patterns: Vec<String> = patterns.iter().map(|s| (*s).to_string()).collect();
        let buffer_size = self.buffer_size;

        Box::pin(async move {
            let channel = self
                .connection
                .create_channel()
                .await
                .map_err(|error| BrokerError::Consume(error.to_string()))?;

            let queue = topology::declare_queue(&channel).await?;
            let queue_name = queue.name().as_str().to_string();
            topology::bind_queue(&channel, &queue_name, &patterns).await?;

            // Auto-acknowledge: the broker considers a message consumed at
            // hand-off, before any handler has run. At-most-once.
            let consumer = channel
                .basic_consume(
                    &queue_name,
                    "",
                    BasicConsumeOptions {
                        no_ack: true,
                        ..BasicConsumeOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|error| BrokerError::Consume(error.to_string()))?;

            tracing::info!(
                exchange = topology::LOGS_EXCHANGE,
                queue = %queue_name,
                patterns = ?patterns,
                "Waiting for messages"
            );

            // Decode on a task that owns the consumer; forward through a
            // buffered channel so the subscriber sees a plain stream.
            let (tx, rx) = mpsc::channel(buffer_size);

            tokio::spawn(async move {
                let mut consumer = consumer;

                while let Some(delivery) = consumer.next().await {
                    match delivery {
                        Ok(delivery) => {
                            let payload = Payload::decode(&delivery.data);
                            if tx.send(payload).await.is_err() {
                                tracing::debug!("Subscriber dropped, exiting consume task");
                                break;
                            }
                        }
                        Err(error) => {
                            // A failed delivery result does not end the
                            // registration; skip it and keep consuming.
                            tracing::warn!(%error, "Error on consume stream");
                        }
                    }
                }

                tracing::debug!(queue = %queue_name, "Consume task exiting");
            });

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amqp_listener_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AmqpListener>();
        assert_sync::<AmqpListener>();
    }

    #[test]
    fn default_buffer_size_is_nonzero() {
        assert!(AmqpListener::DEFAULT_BUFFER_SIZE > 0);
    }
}
