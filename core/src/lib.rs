//! # Logsink Core
//!
//! Core types and seams for the logsink topic listener.
//!
//! This crate defines everything the broker implementation and the service
//! binary agree on:
//!
//! - [`Payload`]: the wire unit carried by every message
//! - [`MessageSource`]: the subscription seam a broker backend implements
//! - [`PayloadHandler`]: the seam a downstream forwarder implements
//! - [`Route`]: the discriminant routing table applied to each payload
//! - [`TopicPattern`]: topic-exchange pattern matching (`*` / `#`)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    Broker    │
//! └──────┬───────┘
//!        │ subscribe(patterns)
//!        ▼
//! ┌──────────────────┐
//! │  MessageSource   │◄─── logsink-amqp in production,
//! │  (PayloadStream) │     InMemoryBroker in tests
//! └────────┬─────────┘
//!          │ Payload
//!          ▼
//! ┌──────────────────┐
//! │    Dispatcher    │◄─── Route::for_name per payload
//! └────────┬─────────┘
//!          │ Forward
//!          ▼
//! ┌──────────────────┐
//! │  PayloadHandler  │◄─── HTTP log forwarder
//! └──────────────────┘
//! ```
//!
//! Setup-phase failures (connection, topology, binding) surface as
//! [`BrokerError`] and are fatal; per-message failures surface as
//! [`HandlerError`] and are contained to the message that caused them.

pub mod broker;
pub mod payload;
pub mod route;
pub mod topic;

pub use broker::{BrokerError, MessageSource, PayloadStream};
pub use payload::Payload;
pub use route::{HandlerError, PayloadHandler, Route};
pub use topic::TopicPattern;
