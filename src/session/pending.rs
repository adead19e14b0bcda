//! Pending-request map correlating responses to outbound requests.
//!
//! Request ids are assigned monotonically here. Each entry holds its own
//! oneshot resolver; an entry is destroyed on settlement (response routed,
//! caller timeout, or connection death) and is never persisted anywhere
//! else. Dropping all senders fails every outstanding wait, which is how
//! cancellation propagates when the connection dies.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::protocol::ResponseFrame;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    waiting: HashMap<u64, oneshot::Sender<ResponseFrame>>,
}

/// Shared between the session task (registering requests) and the reader
/// task (settling them). Guards only correlation state, never session state.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    inner: Mutex<Inner>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next request id and register a resolver for it.
    pub fn register(&self) -> (u64, oneshot::Receiver<ResponseFrame>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("pending map poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.waiting.insert(id, tx);
        (id, rx)
    }

    /// Route a response to its waiter. Returns false for unknown ids
    /// (already settled, timed out, or never ours).
    pub fn settle(&self, response: ResponseFrame) -> bool {
        let sender = {
            let mut inner = self.inner.lock().expect("pending map poisoned");
            inner.waiting.remove(&response.id)
        };
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Discard a registration whose caller gave up (timeout or cancellation).
    pub fn cancel(&self, id: u64) {
        let mut inner = self.inner.lock().expect("pending map poisoned");
        inner.waiting.remove(&id);
    }

    /// Fail every outstanding request; their receivers observe a closed
    /// channel. Called when the connection dies.
    pub fn fail_all(&self) {
        let mut inner = self.inner.lock().expect("pending map poisoned");
        inner.waiting.clear();
    }

    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        self.inner.lock().expect("pending map poisoned").waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: u64) -> ResponseFrame {
        ResponseFrame {
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }

    #[tokio::test]
    async fn ids_are_monotonic() {
        let pending = PendingRequests::new();
        let (first, _rx1) = pending.register();
        let (second, _rx2) = pending.register();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn settle_resolves_the_matching_waiter() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register();

        assert!(pending.settle(response(id)));
        let resolved = rx.await.expect("resolved");
        assert_eq!(resolved.id, id);
        assert_eq!(pending.outstanding(), 0);
    }

    #[tokio::test]
    async fn settle_ignores_unknown_ids() {
        let pending = PendingRequests::new();
        let (_id, _rx) = pending.register();
        assert!(!pending.settle(response(99)));
        assert_eq!(pending.outstanding(), 1);
    }

    #[tokio::test]
    async fn cancel_destroys_the_entry() {
        let pending = PendingRequests::new();
        let (id, mut rx) = pending.register();
        pending.cancel(id);

        assert_eq!(pending.outstanding(), 0);
        assert!(rx.try_recv().is_err());
        // A late response for a cancelled id is dropped.
        assert!(!pending.settle(response(id)));
    }

    #[tokio::test]
    async fn fail_all_closes_every_waiter() {
        let pending = PendingRequests::new();
        let (_a, rx_a) = pending.register();
        let (_b, rx_b) = pending.register();

        pending.fail_all();
        assert!(rx_a.await.is_err());
        assert!(rx_b.await.is_err());
    }
}
