//! Broker error taxonomy.
//!
//! Every variant maps to a stable, machine-readable code via
//! [`BrokerError::code`]. The codes travel over the wire in rejected
//! `response` envelopes, so they must not change once published.

use thiserror::Error;

use crate::envelope::ErrorPayload;

/// Result alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors produced by the message broker.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// An inbound postMessage arrived without a source frame.
    #[error("inbound message has no source frame")]
    MissingFrame,

    /// A required parameter was empty or absent.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The client id is already active.
    #[error("client '{0}' is already subscribed")]
    AlreadySubscribed(String),

    /// The client id is not active.
    #[error("client '{0}' is not subscribed")]
    NotSubscribed(String),

    /// Publish referenced a channel with no registry entry.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// Publish resolved to an empty delivery set.
    #[error("no target clients found in channel '{channel_id}'")]
    TargetsNotFound {
        /// Channel the publish was addressed to.
        channel_id: String,
    },

    /// Sending to a client failed or its reply could not be correlated.
    #[error("transport failure for client '{client_id}': {reason}")]
    Transport {
        /// Client the message was addressed to.
        client_id: String,
        /// Error description.
        reason: String,
    },

    /// A correlated request did not receive a reply in time.
    #[error("request '{request_id}' to client '{client_id}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Client the request was addressed to.
        client_id: String,
        /// Correlation id of the request.
        request_id: String,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The inbound payload is not a broker envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// An in-process message callback returned an error.
    #[error("handler for client '{client_id}' failed: {reason}")]
    Handler {
        /// Client whose handler failed.
        client_id: String,
        /// Error description.
        reason: String,
    },
}

impl BrokerError {
    /// Build a [`BrokerError::Transport`].
    pub fn transport(client_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            client_id: client_id.into(),
            reason: reason.into(),
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFrame => "MISSING_IFRAME_OBJECT",
            Self::MissingParameter(_) => "MISSING_REQUIRED_PARAMETER",
            Self::AlreadySubscribed(_) => "ALREADY_SUBSCRIBED",
            Self::NotSubscribed(_) => "ALREADY_UNSUBSCRIBED",
            Self::UnknownChannel(_) => "UNKNOWN_CHANNEL",
            Self::TargetsNotFound { .. } => "TARGETS_NOT_FOUND",
            Self::Transport { .. } => "TRANSPORT_FAILURE",
            Self::Timeout { .. } => "REQUEST_TIMEOUT",
            Self::InvalidEnvelope(_) => "INVALID_ENVELOPE",
            Self::Handler { .. } => "HANDLER_FAILURE",
        }
    }

    /// Wire representation for rejected responses.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
