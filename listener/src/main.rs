//! Topic-routed log listener.
//!
//! Connects to the broker (retrying with quadratic backoff), binds an
//! exclusive queue to the configured routing-key patterns on the
//! `logs_topic` exchange, and forwards every consumed payload to the log
//! service over HTTP. Runs until SIGTERM/Ctrl+C, then drains in-flight
//! handlers for a configurable grace period.
//!
//! Configuration is environment-only; see [`config::ListenerConfig`].

mod config;
mod dispatch;
mod forward;
mod shutdown;

use config::ListenerConfig;
use dispatch::Dispatcher;
use forward::LogForwarder;
use logsink_amqp::{AmqpListener, ReconnectPolicy};
use logsink_core::{BrokerError, MessageSource, PayloadHandler};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = ListenerConfig::from_env();
    info!(
        broker = config.amqp_url_redacted(),
        log_service = %config.log_service_url,
        topics = ?config.topics,
        dispatch = ?config.dispatch,
        "Starting log listener"
    );

    if let Err(error) = run(config).await {
        error!(%error, "Listener failed");
        std::process::exit(1);
    }
}

async fn run(config: ListenerConfig) -> Result<(), BrokerError> {
    // Setup phase: every failure here is fatal.
    let listener = AmqpListener::connect(&config.amqp_url, ReconnectPolicy::default()).await?;

    let patterns: Vec<&str> = config.topics.iter().map(String::as_str).collect();
    let stream = listener.subscribe(&patterns).await?;

    let forwarder: Arc<dyn PayloadHandler> = Arc::new(LogForwarder::new(&config.log_service_url));
    let dispatcher = Arc::new(Dispatcher::new(forwarder, config.dispatch.clone()));

    // The consume loop lives on its own task; the main task only waits
    // for the stop signal.
    let consume = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.run(stream).await }
    });

    info!("Listening for and consuming broker messages");
    shutdown::wait_for_signal().await;

    info!(
        grace_secs = config.shutdown_grace.as_secs(),
        in_flight = dispatcher.in_flight_count(),
        "Shutting down, draining in-flight handlers"
    );
    consume.abort();
    dispatcher.drain(config.shutdown_grace).await;
    listener.close().await;

    info!("Listener stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logsink_listener=info,logsink_amqp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
