//! Discriminant routing and the downstream handler seam.
//!
//! Every decoded payload is routed by its `name` field. The table is
//! deliberately small: log-like names and everything unrecognized go to
//! the forwarder, `"auth"` is reserved and currently dropped.

use crate::payload::Payload;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Where a payload goes, decided by its `name` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Hand the payload to the configured [`PayloadHandler`].
    Forward,
    /// Drop the payload without invoking any handler.
    Ignore,
}

impl Route {
    /// Look up the route for a payload name.
    ///
    /// | name | route |
    /// |---|---|
    /// | `"log"`, `"event"` | [`Route::Forward`] |
    /// | `"auth"` | [`Route::Ignore`] (reserved for future routing) |
    /// | anything else, including empty | [`Route::Forward`] (fallback) |
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        match name {
            "log" | "event" => Self::Forward,
            "auth" => Self::Ignore,
            _ => Self::Forward,
        }
    }

    /// Route for a payload.
    #[must_use]
    pub fn for_payload(payload: &Payload) -> Self {
        Self::for_name(&payload.name)
    }
}

/// Errors from handing a payload to its downstream consumer.
///
/// By the time a handler runs, the message is already acknowledged; these
/// errors are logged by the dispatcher and dropped, never retried and
/// never surfaced to the broker. Transport failures and unexpected
/// response statuses are distinct values so callers can tell a dead
/// collaborator from a disagreeing one.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The collaborator answered with something other than the expected
    /// accepted status.
    #[error("unexpected response status {status}")]
    UnexpectedStatus {
        /// The HTTP status code that came back.
        status: u16,
    },
}

/// A downstream consumer of forwarded payloads.
///
/// The production implementation POSTs the JSON payload to the log
/// service; tests substitute a capturing double.
pub trait PayloadHandler: Send + Sync {
    /// Handle one payload.
    ///
    /// Takes ownership: every dispatched execution works on its own copy
    /// and shares nothing with its siblings.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the payload could not be delivered.
    fn handle(
        &self,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_and_event_forward() {
        assert_eq!(Route::for_name("log"), Route::Forward);
        assert_eq!(Route::for_name("event"), Route::Forward);
    }

    #[test]
    fn auth_is_ignored() {
        assert_eq!(Route::for_name("auth"), Route::Ignore);
    }

    #[test]
    fn unknown_names_fall_back_to_forward() {
        assert_eq!(Route::for_name("metrics"), Route::Forward);
        assert_eq!(Route::for_name(""), Route::Forward);
        assert_eq!(Route::for_name("AUTH"), Route::Forward); // case sensitive
    }

    #[test]
    fn route_for_payload_uses_name_field() {
        let payload = Payload::new("auth", "x");
        assert_eq!(Route::for_payload(&payload), Route::Ignore);
    }
}
