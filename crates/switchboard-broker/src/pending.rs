//! Pending postMessage requests, correlated by responder and request id.
//!
//! A forwarded request registers a oneshot receiver under
//! `(target client id, request id)`. The matching inbound `response`
//! envelope resolves it. Dropping an entry (client left, shutdown) drops
//! the sender, so the awaiting side observes a closed channel.

use std::collections::HashMap;

use parking_lot::Mutex;
use switchboard_core::ResponseBody;
use tokio::sync::oneshot;

type Key = (String, String);

/// Tracks outstanding correlated requests to embedded clients.
#[derive(Debug, Default)]
pub struct PendingRequests {
    pending: Mutex<HashMap<Key, oneshot::Sender<ResponseBody>>>,
}

impl PendingRequests {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request, returning a receiver for its response.
    ///
    /// Registering the same pair again replaces the earlier entry; its
    /// receiver observes a closed channel.
    pub fn register(&self, client_id: &str, request_id: &str) -> oneshot::Receiver<ResponseBody> {
        let (tx, rx) = oneshot::channel();
        let count = {
            let mut pending = self.pending.lock();
            let _ = pending.insert((client_id.to_string(), request_id.to_string()), tx);
            pending.len()
        };
        metrics::gauge!("broker_pending_requests").set(count as f64);
        rx
    }

    /// Resolve a pending request. Returns `false` if nothing matched.
    pub fn resolve(&self, client_id: &str, request_id: &str, body: ResponseBody) -> bool {
        match self.take(client_id, request_id) {
            Some(tx) => tx.send(body).is_ok(),
            None => false,
        }
    }

    /// Drop a pending request without resolving it.
    pub fn remove(&self, client_id: &str, request_id: &str) -> bool {
        self.take(client_id, request_id).is_some()
    }

    fn take(&self, client_id: &str, request_id: &str) -> Option<oneshot::Sender<ResponseBody>> {
        let (tx, count) = {
            let mut pending = self.pending.lock();
            let tx = pending.remove(&(client_id.to_string(), request_id.to_string()));
            (tx, pending.len())
        };
        metrics::gauge!("broker_pending_requests").set(count as f64);
        tx
    }

    /// Drop every pending request addressed to `client_id`.
    pub fn drop_client(&self, client_id: &str) -> usize {
        let (dropped, count) = {
            let mut pending = self.pending.lock();
            let before = pending.len();
            pending.retain(|(target, _), _| target != client_id);
            (before - pending.len(), pending.len())
        };
        metrics::gauge!("broker_pending_requests").set(count as f64);
        dropped
    }

    /// Check if a request is pending.
    pub fn has_pending(&self, client_id: &str, request_id: &str) -> bool {
        self.pending
            .lock()
            .contains_key(&(client_id.to_string(), request_id.to_string()))
    }

    /// Number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel all pending requests.
    pub fn cancel_all(&self) {
        self.pending.lock().clear();
        metrics::gauge!("broker_pending_requests").set(0.0);
    }
}
