//! Concurrent payload dispatch.
//!
//! The dispatcher owns the steady-state half of the listener: it pulls
//! decoded payloads off the consume stream, routes each one by its
//! discriminant, and runs the forwarding handler on its own task. Handler
//! failures are logged and dropped — by the time a handler runs the
//! message is already acknowledged, so there is nobody left to tell.

use crate::config::DispatchMode;
use futures::StreamExt;
use logsink_core::{Payload, PayloadHandler, PayloadStream, Route};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};

/// Routes payloads to the handler, one concurrent execution per payload.
///
/// Two scheduling modes (see [`DispatchMode`]):
///
/// - **Unbounded** (default): every forwarded payload gets its own
///   `tokio::spawn`. No pooling, no queue, no backpressure toward the
///   broker; the broker's own flow control is the only throttle, and
///   with auto-acknowledged consumption even that is weak.
/// - **Pooled**: a bounded queue in front of a fixed set of workers.
///   When the queue fills, `dispatch` blocks the consume loop, which is
///   the explicit backpressure the unbounded mode refuses to apply.
///
/// Execution order across payloads is not guaranteed in either mode.
pub struct Dispatcher {
    handler: Arc<dyn PayloadHandler>,
    pool: Option<mpsc::Sender<(Payload, InFlightGuard)>>,
    in_flight: InFlight,
}

impl Dispatcher {
    /// Build a dispatcher and, in pooled mode, spawn its workers.
    #[must_use]
    pub fn new(handler: Arc<dyn PayloadHandler>, mode: DispatchMode) -> Self {
        let in_flight = InFlight::default();

        let pool = match mode {
            DispatchMode::Unbounded => None,
            DispatchMode::Pooled {
                workers,
                queue_depth,
            } => {
                let (tx, rx) = mpsc::channel::<(Payload, InFlightGuard)>(queue_depth);
                let rx = Arc::new(Mutex::new(rx));

                tracing::info!(workers, queue_depth, "Dispatching through a bounded pool");
                for worker in 0..workers {
                    let rx = Arc::clone(&rx);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        loop {
                            let next = { rx.lock().await.recv().await };
                            let Some((payload, guard)) = next else { break };
                            run_handler(handler.as_ref(), payload).await;
                            drop(guard);
                        }
                        tracing::debug!(worker, "Dispatch worker exiting");
                    });
                }
                Some(tx)
            }
        };

        Self {
            handler,
            pool,
            in_flight,
        }
    }

    /// Consume the stream for the life of the process.
    ///
    /// Delivery order from the broker is preserved into this loop;
    /// everything past `dispatch` is unordered.
    pub async fn run(&self, mut stream: PayloadStream) {
        while let Some(payload) = stream.next().await {
            self.dispatch(payload).await;
        }
        tracing::info!("Consume stream ended");
    }

    /// Route one payload.
    ///
    /// `"auth"` payloads are dropped (reserved route); everything else
    /// goes to the handler on its own concurrent execution. Only pooled
    /// mode can make this call wait, and only when its queue is full.
    pub async fn dispatch(&self, payload: Payload) {
        match Route::for_payload(&payload) {
            Route::Ignore => {
                tracing::trace!(name = %payload.name, "Reserved route, dropping payload");
            }
            Route::Forward => {
                let guard = self.in_flight.start();
                if let Some(tx) = &self.pool {
                    if tx.send((payload, guard)).await.is_err() {
                        tracing::error!("Dispatch pool is gone, dropping payload");
                    }
                } else {
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        run_handler(handler.as_ref(), payload).await;
                        drop(guard);
                    });
                }
            }
        }
    }

    /// Wait for in-flight handler executions (queued ones included) to
    /// finish, up to `grace`.
    ///
    /// Returns `true` when everything drained, `false` when the grace
    /// period expired first; stragglers are abandoned to process exit.
    pub async fn drain(&self, grace: Duration) -> bool {
        if tokio::time::timeout(grace, self.in_flight.wait_idle())
            .await
            .is_ok()
        {
            true
        } else {
            tracing::warn!(
                still_running = self.in_flight.count(),
                "Grace period expired with handlers still in flight"
            );
            false
        }
    }

    /// Number of handler executions currently queued or running.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.count()
    }
}

/// Run the handler for one payload; failures end here.
async fn run_handler(handler: &dyn PayloadHandler, payload: Payload) {
    let name = payload.name.clone();
    if let Err(error) = handler.handle(payload).await {
        tracing::error!(%error, name = %name, "Forwarding failed, message dropped");
    }
}

/// Counter of live handler executions, wakeable at zero.
#[derive(Clone, Default)]
struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Default)]
struct InFlightInner {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            if self.count() == 0 {
                return;
            }
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register with the notify list before re-checking, so the
            // final guard dropping in the gap cannot be missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
