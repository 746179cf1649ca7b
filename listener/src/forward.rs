//! HTTP forwarding to the log service.
//!
//! The log service is an external collaborator: it accepts a JSON payload
//! at a fixed endpoint and answers `202 Accepted` when it has taken the
//! entry. Anything else is a forwarding failure. The reference
//! implementation silently returned success for a non-202 response; here
//! the two failure shapes are distinct, surfaced error values.

use logsink_core::{HandlerError, Payload, PayloadHandler};
use reqwest::StatusCode;
use std::future::Future;
use std::pin::Pin;

/// Forwards payloads to the log service over HTTP.
pub struct LogForwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl LogForwarder {
    /// Create a forwarder posting to `endpoint`.
    ///
    /// The underlying client pools connections, so one forwarder is
    /// shared across all dispatched executions.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint this forwarder posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PayloadHandler for LogForwarder {
    fn handle(
        &self,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&payload)
                .send()
                .await
                .map_err(|error| HandlerError::Transport(error.to_string()))?;

            let status = response.status();
            if status == StatusCode::ACCEPTED {
                tracing::debug!(name = %payload.name, "Payload forwarded");
                Ok(())
            } else {
                Err(HandlerError::UnexpectedStatus {
                    status: status.as_u16(),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    type Received = Arc<Mutex<Vec<Payload>>>;

    /// Stand up a capture endpoint answering `status`; returns its
    /// address and the capture buffer.
    async fn log_service(status: StatusCode) -> (SocketAddr, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route(
                "/log",
                post(
                    move |State(received): State<Received>, Json(payload): Json<Payload>| async move {
                        received.lock().await.push(payload);
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&received));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (addr, received)
    }

    #[tokio::test]
    async fn accepted_response_is_success() {
        let (addr, received) = log_service(StatusCode::ACCEPTED).await;
        let forwarder = LogForwarder::new(format!("http://{addr}/log"));

        let payload = Payload::new("log", "disk usage at 91%");
        forwarder.handle(payload.clone()).await.unwrap();

        // The body that arrived is the payload, verbatim.
        assert_eq!(*received.lock().await, vec![payload]);
    }

    #[tokio::test]
    async fn non_accepted_status_is_a_distinct_error() {
        let (addr, _received) = log_service(StatusCode::INTERNAL_SERVER_ERROR).await;
        let forwarder = LogForwarder::new(format!("http://{addr}/log"));

        let result = forwarder.handle(Payload::new("log", "x")).await;

        match result {
            Err(HandlerError::UnexpectedStatus { status }) => assert_eq!(status, 500),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ok_is_not_accepted() {
        // 200 is not the contract; only 202 counts as delivered.
        let (addr, _received) = log_service(StatusCode::OK).await;
        let forwarder = LogForwarder::new(format!("http://{addr}/log"));

        let result = forwarder.handle(Payload::new("log", "x")).await;
        assert!(matches!(
            result,
            Err(HandlerError::UnexpectedStatus { status: 200 })
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 1 on loopback refuses connections.
        let forwarder = LogForwarder::new("http://127.0.0.1:1/log");

        let result = forwarder.handle(Payload::new("log", "x")).await;
        assert!(matches!(result, Err(HandlerError::Transport(_))));
    }
}
