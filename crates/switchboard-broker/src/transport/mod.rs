//! Delivery to a single client.
//!
//! The [`Transport`] contract hides whether a client lives in this process
//! or behind a `postMessage` boundary. The implementation is chosen at
//! subscribe time and stored on the subscription.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `in_process` | Direct callback invocation |
//! | `post_message` | Envelope posting with correlated response await |

mod in_process;
mod post_message;

pub use in_process::InProcessTransport;
pub use post_message::PostMessageTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::Result;

use crate::endpoint::ConnectionChange;

/// Which transport a client is reached through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    /// Direct callbacks.
    InProcess,
    /// Embedded frame.
    PostMessage,
}

/// A published message on its way to one target.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// Original sender.
    pub sender_id: String,
    /// Channel of the publish.
    pub channel_id: String,
    /// Request id chosen by the sender; replies carry it back.
    pub message_id: String,
    /// Application message name.
    pub message_name: String,
    /// Payload.
    pub data: Value,
}

/// Sends messages to one client.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport kind.
    fn kind(&self) -> TransportKind;

    /// Origin of an embedded client.
    fn origin(&self) -> Option<&str> {
        None
    }

    /// Deliver a message and await the client's answer.
    ///
    /// `Ok(None)` means the client did not answer.
    async fn request(&self, delivery: &Delivery) -> Result<Option<Value>>;

    /// Relay `responder_id`'s answer to this client, the original sender.
    async fn reply(&self, responder_id: &str, delivery: &Delivery, data: Value) -> Result<()>;

    /// Tell this client that another client connected or disconnected.
    async fn notify(&self, change: &ConnectionChange) -> Result<()>;
}

/// A null answer counts as no answer.
pub(crate) fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
