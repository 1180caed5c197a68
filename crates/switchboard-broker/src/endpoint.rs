//! Client-facing seams.
//!
//! An in-process client supplies a [`MessageHandler`] and a
//! [`ConnectionHandler`]. An embedded client is reached through a
//! [`FramePort`] plus the origin it was loaded from. [`ClientEndpoint`]
//! carries one or the other into `subscribe`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{BrokerError, ConnectionEventKind, Envelope};

/// Error type returned by in-process callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A message delivered to an in-process client.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientMessage {
    /// Client that sent (or answered) the message.
    pub sender_id: String,
    /// Channel the message travelled on.
    pub channel_id: String,
    /// Application message name.
    pub message_name: String,
    /// Payload.
    pub data: Value,
    /// Set only on replies: the id of the request being answered.
    pub request_id: Option<String>,
}

/// A connection or disconnection of another client.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionChange {
    /// Connected or disconnected.
    pub kind: ConnectionEventKind,
    /// The client whose state changed.
    pub client_id: String,
    /// Its channels.
    pub subscribed_channels: Vec<String>,
    /// Its subscription data.
    pub data: Value,
}

/// Message callback of an in-process client.
///
/// Returning `Ok(Some(value))` (with a non-null value) answers the request;
/// the value is relayed to the original sender.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    async fn on_message(&self, message: ClientMessage) -> Result<Option<Value>, HandlerError>;
}

/// Connection callback of an in-process client.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Observe another client connecting or disconnecting.
    async fn on_connection_change(&self, change: ConnectionChange) -> Result<(), HandlerError>;
}

/// Outbound half of a `postMessage` boundary.
pub trait FramePort: Send + Sync {
    /// Post an envelope to the frame, restricted to `target_origin`.
    fn post(&self, envelope: &Envelope, target_origin: &str) -> Result<(), BrokerError>;

    /// Whether the frame is still reachable.
    fn is_open(&self) -> bool {
        true
    }
}

/// How a subscribing client is reached.
#[derive(Clone)]
pub enum ClientEndpoint {
    /// Direct callbacks in this process. Both must be present.
    InProcess {
        /// Message callback.
        on_message: Option<Arc<dyn MessageHandler>>,
        /// Connection callback.
        on_connection: Option<Arc<dyn ConnectionHandler>>,
    },
    /// An embedded frame reached through `postMessage`.
    Frame {
        /// The frame's outbound port.
        port: Arc<dyn FramePort>,
        /// Origin used as the post target.
        origin: String,
    },
}

impl ClientEndpoint {
    /// In-process endpoint with both callbacks present.
    pub fn in_process(
        on_message: Arc<dyn MessageHandler>,
        on_connection: Arc<dyn ConnectionHandler>,
    ) -> Self {
        Self::InProcess {
            on_message: Some(on_message),
            on_connection: Some(on_connection),
        }
    }

    /// Embedded-frame endpoint.
    pub fn frame(port: Arc<dyn FramePort>, origin: impl Into<String>) -> Self {
        Self::Frame {
            port,
            origin: origin.into(),
        }
    }
}

impl std::fmt::Debug for ClientEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess {
                on_message,
                on_connection,
            } => f
                .debug_struct("InProcess")
                .field("on_message", &on_message.is_some())
                .field("on_connection", &on_connection.is_some())
                .finish(),
            Self::Frame { origin, .. } => f.debug_struct("Frame").field("origin", origin).finish(),
        }
    }
}
