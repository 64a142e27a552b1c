use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::protocol::CorrelationId;

/// A request sent into the tunnel and still waiting for its response
///
/// Owned by the correlation registry. It is consumed exactly once: either
/// [`PendingRequest::resolve`] delivers the matched payload, or the entry is
/// dropped when its deadline passes.
#[derive(Debug)]
pub struct PendingRequest {
    /// Identifier echoed back on the response frame
    pub id: CorrelationId,

    /// When the request entered the tunnel
    pub created_at: Instant,

    /// After this instant the waiter gives up with a timeout
    pub deadline: Instant,

    responder: oneshot::Sender<Vec<u8>>,
}

impl PendingRequest {
    /// Create a new pending entry and the receiver its waiter awaits
    pub fn new(id: CorrelationId, timeout: Duration) -> (Self, oneshot::Receiver<Vec<u8>>) {
        let (responder, rx) = oneshot::channel();
        let created_at = Instant::now();
        let pending = Self {
            id,
            created_at,
            deadline: created_at + timeout,
            responder,
        };
        (pending, rx)
    }

    /// Time spent in the tunnel so far
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Hand the response payload to the waiter
    ///
    /// Returns false if the waiter is already gone.
    pub fn resolve(self, payload: Vec<u8>) -> bool {
        self.responder.send(payload).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_correlation_id;

    #[tokio::test]
    async fn test_pending_request_resolve() {
        let id = generate_correlation_id();
        let (pending, rx) = PendingRequest::new(id, Duration::from_secs(30));

        assert_eq!(pending.id, id);
        assert!(pending.resolve(b"HTTP/1.1 200 OK\r\n\r\n".to_vec()));
        assert_eq!(rx.await.unwrap(), b"HTTP/1.1 200 OK\r\n\r\n");
    }

    #[tokio::test]
    async fn test_pending_request_waiter_gone() {
        let (pending, rx) = PendingRequest::new(generate_correlation_id(), Duration::from_secs(1));
        drop(rx);

        assert!(!pending.resolve(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_pending_request_deadline() {
        let (pending, _rx) =
            PendingRequest::new(generate_correlation_id(), Duration::from_secs(30));

        assert_eq!(pending.deadline - pending.created_at, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_pending_request_age() {
        let (pending, _rx) =
            PendingRequest::new(generate_correlation_id(), Duration::from_secs(30));

        assert_eq!(pending.age(pending.created_at), Duration::ZERO);
        assert_eq!(
            pending.age(pending.created_at + Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }
}
