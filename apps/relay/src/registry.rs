//! Correlation registry
//!
//! Every request sent into the tunnel gets a fresh identifier and a
//! [`PendingRequest`] entry. Responses are matched by identifier, never by
//! arrival order. An entry leaves the map exactly once: either a matching frame
//! resolves it, or its waiter removes it at the deadline. Removal happens under
//! the map lock, so the two outcomes cannot both fire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};
use ws_tunnel_common::{
    CorrelationId, Frame, PendingRequest, Result, TunnelError, generate_correlation_id,
    protocol::encode_frame,
};

use crate::session::RelaySession;

pub struct CorrelationRegistry {
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
    session: Arc<RelaySession>,
}

impl CorrelationRegistry {
    pub fn new(session: Arc<RelaySession>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            session,
        }
    }

    /// Send a request through the tunnel and wait for its response payload
    ///
    /// Fails immediately with `TunnelUnavailable` when no session is open, and
    /// with `Timeout` when nothing matching arrives within `timeout`.
    pub async fn submit(&self, payload: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if !self.session.is_open().await {
            return Err(TunnelError::tunnel_unavailable());
        }

        let (id, deadline, rx) = self.register(timeout).await;

        if let Err(e) = self.session.send(encode_frame(&id, payload)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        debug!("Sent request {} into the tunnel ({} bytes)", id, payload.len());

        self.wait(id, deadline, rx).await
    }

    /// Match a response frame against the pending requests
    ///
    /// Returns `Ok(false)` when no request is waiting for the identifier, which
    /// covers responses that arrive after their own timeout.
    pub async fn on_frame_received(&self, bytes: &[u8]) -> Result<bool> {
        let frame = Frame::decode(bytes)?;

        let mut pending = self.pending.lock().await;
        let Some(entry) = pending.remove(&frame.id) else {
            return Ok(false);
        };

        debug!(
            "Resolved request {} after {:?} ({} bytes)",
            frame.id,
            entry.age(Instant::now()),
            frame.payload.len()
        );

        // Resolve while still holding the lock so a racing timeout observes the payload
        Ok(entry.resolve(frame.payload))
    }

    /// Number of requests currently waiting for a response
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn register(
        &self,
        timeout: Duration,
    ) -> (CorrelationId, Instant, oneshot::Receiver<Vec<u8>>) {
        let mut pending = self.pending.lock().await;

        let mut id = generate_correlation_id();
        while pending.contains_key(&id) {
            id = generate_correlation_id();
        }

        let (entry, rx) = PendingRequest::new(id, timeout);
        let deadline = entry.deadline;
        pending.insert(id, entry);

        (id, deadline, rx)
    }

    async fn wait(
        &self,
        id: CorrelationId,
        deadline: Instant,
        mut rx: oneshot::Receiver<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(TunnelError::InternalError(format!(
                "Pending request {} was dropped",
                id
            ))),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                if pending.remove(&id).is_some() {
                    warn!("Timeout: no response from the client for request {}", id);
                    return Err(TunnelError::Timeout);
                }

                // Resolved between the deadline firing and taking the lock
                rx.try_recv().map_err(|_| TunnelError::Timeout)
            }
        }
    }
}
