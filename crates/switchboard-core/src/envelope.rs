//! postMessage envelope format.
//!
//! Every message crossing a frame boundary is wrapped in an [`Envelope`]:
//!
//! ```json
//! { "type": "request", "service": "sap.ushell.services.MessageBroker",
//!   "request_id": "...", "body": { ... } }
//! ```
//!
//! The body shape depends on `type`. Outbound bodies are built from the
//! typed [`RequestBody`], [`ResponseBody`] and [`EventBody`]; inbound
//! bodies are decoded lazily with [`Envelope::request_body`] and
//! [`Envelope::response_body`] once the envelope kind is known.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{BROKER_CHANNEL_ID, SERVICE_NAME};
use crate::errors::{BrokerError, Result};
use crate::ids::generate_event_id;

/// Envelope discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    /// Inbound operation or forwarded publish.
    Request,
    /// Answer correlated to a request.
    Response,
    /// Connection notification, never answered.
    Event,
}

/// Wire envelope exchanged with embedded clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope discriminator.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    /// Service identifier; envelopes for other services are ignored.
    pub service: String,
    /// Correlation id.
    pub request_id: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// `request` envelope forwarding a publish to an embedded client.
    pub fn request(request_id: impl Into<String>, body: &RequestBody) -> Self {
        Self::wrap(EnvelopeType::Request, request_id.into(), body)
    }

    /// `response` envelope correlated to `request_id`.
    pub fn response(request_id: impl Into<String>, body: &ResponseBody) -> Self {
        Self::wrap(EnvelopeType::Response, request_id.into(), body)
    }

    /// `event` envelope with a freshly generated request id.
    pub fn event(body: &EventBody) -> Self {
        Self::wrap(EnvelopeType::Event, generate_event_id(), body)
    }

    fn wrap<B: Serialize>(kind: EnvelopeType, request_id: String, body: &B) -> Self {
        Self {
            kind,
            service: SERVICE_NAME.to_string(),
            request_id,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    /// Parse an envelope from raw JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BrokerError::InvalidEnvelope(e.to_string()))
    }

    /// Whether the envelope targets the broker service.
    pub fn is_broker_service(&self) -> bool {
        self.service == SERVICE_NAME
    }

    /// Decode the body as a [`RequestBody`].
    pub fn request_body(&self) -> Result<RequestBody> {
        RequestBody::deserialize(&self.body)
            .map_err(|e| BrokerError::InvalidEnvelope(format!("request body: {e}")))
    }

    /// Decode the body as a [`ResponseBody`].
    pub fn response_body(&self) -> Result<ResponseBody> {
        ResponseBody::deserialize(&self.body)
            .map_err(|e| BrokerError::InvalidEnvelope(format!("response body: {e}")))
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Entry in an inbound `subscribedChannels` list.
///
/// Frames send either bare channel ids or `{ "channelId": ... }` objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    /// Bare channel id.
    Id(String),
    /// Object form.
    Object {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: String,
    },
}

impl ChannelRef {
    /// The referenced channel id.
    pub fn channel_id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { channel_id: id } => id,
        }
    }
}

impl From<&str> for ChannelRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

/// Body of a `request` envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    /// Channel the message belongs to.
    #[serde(default)]
    pub channel_id: String,
    /// Sending client.
    #[serde(default)]
    pub client_id: String,
    /// Operation or application message name.
    #[serde(default)]
    pub message_name: String,
    /// Application payload.
    #[serde(default)]
    pub data: Value,
    /// Channels to join (connect only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribed_channels: Option<Vec<ChannelRef>>,
    /// Addressed clients (publish only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_client_ids: Option<Vec<String>>,
}

/// Outcome marker on connect responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Operation succeeded.
    Accepted,
    /// Operation failed; see `error`.
    Rejected,
}

/// Machine-readable failure attached to rejected responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// A currently connected client as reported to a new subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveClient {
    /// Client id.
    pub client_id: String,
    /// Channels the client joined.
    pub subscribed_channels: Vec<String>,
}

/// Body of a `response` envelope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    /// Channel of the original request.
    #[serde(default)]
    pub channel_id: String,
    /// Responding client (or the requester, for connect/disconnect).
    #[serde(default)]
    pub client_id: String,
    /// Request id being answered.
    #[serde(default)]
    pub correlation_message_id: String,
    /// Message name of the original request.
    #[serde(default)]
    pub message_name: String,
    /// Reply payload.
    #[serde(default)]
    pub data: Value,
    /// Previously active clients (connect only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_clients: Option<Vec<ActiveClient>>,
    /// Outcome marker (connect, and rejected operations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    /// Failure detail when `status` is `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Connection event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionEventKind {
    /// A client subscribed.
    #[serde(rename = "clientConnected")]
    Connected,
    /// A client unsubscribed.
    #[serde(rename = "clientDisconnected")]
    Disconnected,
}

impl ConnectionEventKind {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "clientConnected",
            Self::Disconnected => "clientDisconnected",
        }
    }
}

/// Body of an `event` envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    /// Always the broker channel.
    pub channel_id: String,
    /// Client that connected or disconnected.
    pub client_id: String,
    /// Event name.
    pub message_name: ConnectionEventKind,
    /// Channels of the client.
    pub subscribed_channels: Vec<String>,
    /// Subscription data of the client.
    #[serde(default)]
    pub data: Value,
}

impl EventBody {
    /// Event body on the broker channel.
    pub fn new(
        kind: ConnectionEventKind,
        client_id: impl Into<String>,
        subscribed_channels: Vec<String>,
        data: Value,
    ) -> Self {
        Self {
            channel_id: BROKER_CHANNEL_ID.to_string(),
            client_id: client_id.into(),
            message_name: kind,
            subscribed_channels,
            data,
        }
    }
}
