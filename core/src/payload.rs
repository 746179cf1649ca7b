//! The wire payload carried by every broker message.
//!
//! Messages are UTF-8 JSON objects of the form `{"name": ..., "data": ...}`
//! with no envelope or version field. The `name` field is the routing
//! discriminant (see [`crate::route`]); `data` is an opaque string the
//! downstream log service stores verbatim.

use serde::{Deserialize, Serialize};

/// A decoded broker message.
///
/// Payloads have no identity beyond delivery order and are never
/// deduplicated.
///
/// # Example
///
/// ```
/// use logsink_core::Payload;
///
/// let payload = Payload::new("log", "disk usage at 91%");
/// let json = serde_json::to_string(&payload).unwrap();
/// assert_eq!(json, r#"{"name":"log","data":"disk usage at 91%"}"#);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Routing discriminant (`"log"`, `"event"`, `"auth"`, ...).
    pub name: String,
    /// Message content, opaque to the listener.
    pub data: String,
}

impl Payload {
    /// Create a payload from name and data.
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Decode a raw message body.
    ///
    /// A malformed body never aborts the consume stream: it decodes to the
    /// zero-value payload (empty `name`, empty `data`), which the routing
    /// table sends down the fallback route. The failure is logged at `warn`
    /// so malformed traffic stays visible.
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    %error,
                    body_len = body.len(),
                    "Malformed message body, substituting empty payload"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_body() {
        let payload = Payload::decode(br#"{"name":"log","data":"hello"}"#);
        assert_eq!(payload, Payload::new("log", "hello"));
    }

    #[test]
    fn malformed_body_decodes_to_zero_value() {
        let payload = Payload::decode(b"not json at all");
        assert_eq!(payload, Payload::default());
        assert!(payload.name.is_empty());
        assert!(payload.data.is_empty());
    }

    #[test]
    fn missing_fields_decode_to_zero_value() {
        // A JSON object without the required fields is malformed too.
        let payload = Payload::decode(br#"{"unexpected":true}"#);
        assert_eq!(payload, Payload::default());
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let payload = Payload::new("event", "user signed in");
        let json = serde_json::to_vec(&payload).unwrap();
        assert_eq!(Payload::decode(&json), payload);
    }
}
