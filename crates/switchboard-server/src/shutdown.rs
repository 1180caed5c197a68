//! Gateway shutdown: abandon correlated requests, close frames, drain tasks.
//!
//! [`ShutdownCoordinator::shutdown`] first cancels the broker, so every
//! publish still waiting on a frame's response fails instead of hanging,
//! then cancels the token that the listener and each frame session watch.
//! [`ShutdownCoordinator::graceful_shutdown`] additionally waits for the
//! listener task and for every frame session to finish its cleanup.

use std::sync::Arc;
use std::time::Duration;

use switchboard_broker::MessageBroker;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::frames::FrameSet;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const FRAME_DRAIN_POLL: Duration = Duration::from_millis(10);

/// What a graceful shutdown left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Correlated requests that were still waiting on a frame.
    pub abandoned_requests: usize,
    /// Frame sessions still registered when the drain gave up.
    pub remaining_frames: usize,
    /// Whether the drain finished before the timeout.
    pub completed: bool,
}

/// Stops the broker and the gateway together.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    broker: Arc<MessageBroker>,
    frames: Arc<FrameSet>,
}

impl ShutdownCoordinator {
    /// Coordinator for `broker` and the frame sessions tracked in `frames`.
    pub fn new(broker: Arc<MessageBroker>, frames: Arc<FrameSet>) -> Self {
        Self {
            token: CancellationToken::new(),
            broker,
            frames,
        }
    }

    /// Token watched by the listener and by every frame session.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel pending broker requests, then signal every session to close.
    ///
    /// Idempotent; returns how many correlated requests were abandoned.
    pub fn shutdown(&self) -> usize {
        if self.token.is_cancelled() {
            return 0;
        }
        let abandoned = self.broker.pending_request_count();
        self.broker.shutdown();
        self.token.cancel();
        abandoned
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down, then wait up to `timeout` for `handles` and for every
    /// frame session to unregister.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let abandoned_requests = self.shutdown();
        info!(
            abandoned_requests,
            frames = self.frames.len(),
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining gateway"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            while !self.frames.is_empty() {
                tokio::time::sleep(FRAME_DRAIN_POLL).await;
            }
        };
        let completed = tokio::time::timeout(timeout, drain).await.is_ok();
        let remaining_frames = self.frames.len();
        if !completed {
            warn!(remaining_frames, "shutdown timed out after {timeout:?}");
        }
        ShutdownReport {
            abandoned_requests,
            remaining_frames,
            completed,
        }
    }
}
