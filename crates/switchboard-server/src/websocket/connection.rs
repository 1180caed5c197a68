//! Per-socket frame state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use switchboard_broker::FramePort;
use switchboard_core::{BrokerError, Envelope};
use tokio::sync::mpsc;

use crate::metrics::FRAME_OUTBOUND_DROPS_TOTAL;

/// One embedded frame, reached over a `WebSocket`.
pub struct FrameConnection {
    /// Unique connection id.
    pub id: String,
    /// Origin presented at upgrade.
    pub origin: String,
    /// Send channel to the socket's write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the frame has responded to the last ping.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Envelopes dropped because the queue was full or closed.
    dropped_messages: AtomicU64,
    /// Broker client ids connected through this socket.
    clients: Mutex<Vec<String>>,
}

impl FrameConnection {
    /// Create a new connection.
    pub fn new(id: String, origin: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            origin,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text message for the frame.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(FRAME_OUTBOUND_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record a client id that connected through this socket.
    pub fn track_client(&self, client_id: &str) {
        let mut clients = self.clients.lock();
        if !clients.iter().any(|c| c == client_id) {
            clients.push(client_id.to_string());
        }
    }

    /// Forget a client id after it disconnected.
    pub fn untrack_client(&self, client_id: &str) {
        self.clients.lock().retain(|c| c != client_id);
    }

    /// Take every tracked client id, leaving none.
    pub fn take_clients(&self) -> Vec<String> {
        std::mem::take(&mut *self.clients.lock())
    }

    /// Client ids currently tracked.
    pub fn clients(&self) -> Vec<String> {
        self.clients.lock().clone()
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

impl FramePort for FrameConnection {
    fn post(&self, envelope: &Envelope, target_origin: &str) -> Result<(), BrokerError> {
        if target_origin != "*" && target_origin != self.origin {
            return Err(BrokerError::transport(
                &self.id,
                format!("target origin '{target_origin}' does not match '{}'", self.origin),
            ));
        }
        if self.send(Arc::new(envelope.to_json())) {
            Ok(())
        } else if self.tx.is_closed() {
            Err(BrokerError::transport(&self.id, "frame is gone"))
        } else {
            Err(BrokerError::transport(&self.id, "outbound queue is full"))
        }
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
