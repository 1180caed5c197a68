//! Normalization of inbound `request` envelopes.
//!
//! The message name selects the operation: `connect` subscribes the
//! sender, `disconnect` unsubscribes it, anything else is a publish.

use serde_json::{Value, json};
use switchboard_core::constants::{CONNECT, DISCONNECT};
use switchboard_core::{
    BrokerError, Envelope, EnvelopeType, RequestBody, ResponseBody, ResponseStatus, Result,
};

use crate::router::PublishRequest;

/// An inbound operation.
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerRequest {
    /// Subscribe the sending frame.
    Connect {
        /// Correlation id of the request.
        request_id: String,
        /// Channel the request was sent on.
        channel_id: String,
        /// Client id to register.
        client_id: String,
        /// Channels to join.
        channels: Vec<String>,
        /// Subscription data.
        data: Value,
    },
    /// Unsubscribe the sending frame.
    Disconnect {
        /// Correlation id of the request.
        request_id: String,
        /// Channel the request was sent on.
        channel_id: String,
        /// Client id to remove.
        client_id: String,
    },
    /// Publish on a channel.
    Publish(PublishRequest),
}

impl BrokerRequest {
    /// Normalize a `request` envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        if envelope.kind != EnvelopeType::Request {
            return Err(BrokerError::InvalidEnvelope(format!(
                "expected a request, got {:?}",
                envelope.kind
            )));
        }
        Ok(Self::from_body(&envelope.request_id, envelope.request_body()?))
    }

    fn from_body(request_id: &str, body: RequestBody) -> Self {
        let request_id = request_id.to_string();
        if body.message_name == CONNECT {
            Self::Connect {
                request_id,
                channel_id: body.channel_id,
                client_id: body.client_id,
                channels: body
                    .subscribed_channels
                    .unwrap_or_default()
                    .iter()
                    .map(|c| c.channel_id().to_string())
                    .collect(),
                data: body.data,
            }
        } else if body.message_name == DISCONNECT {
            Self::Disconnect {
                request_id,
                channel_id: body.channel_id,
                client_id: body.client_id,
            }
        } else {
            Self::Publish(PublishRequest {
                channel_id: body.channel_id,
                sender_id: body.client_id,
                message_id: request_id,
                message_name: body.message_name,
                target_client_ids: body.target_client_ids.unwrap_or_default(),
                data: body.data,
            })
        }
    }

    /// Operation name for logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Connect { .. } => CONNECT,
            Self::Disconnect { .. } => DISCONNECT,
            Self::Publish(p) => &p.message_name,
        }
    }

    /// Client id of the requester.
    pub fn client_id(&self) -> &str {
        match self {
            Self::Connect { client_id, .. } | Self::Disconnect { client_id, .. } => client_id,
            Self::Publish(p) => &p.sender_id,
        }
    }

    /// Response body acknowledging a connect or disconnect.
    ///
    /// `None` for publishes, which answer only with a handler's value.
    pub fn acknowledgement(&self) -> Option<(String, ResponseBody)> {
        match self {
            Self::Connect {
                request_id,
                channel_id,
                client_id,
                ..
            }
            | Self::Disconnect {
                request_id,
                channel_id,
                client_id,
            } => Some((
                request_id.clone(),
                ResponseBody {
                    channel_id: channel_id.clone(),
                    client_id: client_id.clone(),
                    correlation_message_id: request_id.clone(),
                    message_name: self.name().to_string(),
                    data: json!({}),
                    ..ResponseBody::default()
                },
            )),
            Self::Publish(_) => None,
        }
    }
}

/// Rejected `response` for a failed connect or disconnect.
///
/// Returns `None` when `envelope` is not a connect or disconnect request.
pub fn rejection(envelope: &Envelope, error: &BrokerError) -> Option<Envelope> {
    let request = BrokerRequest::from_envelope(envelope).ok()?;
    let (request_id, mut body) = request.acknowledgement()?;
    body.status = Some(ResponseStatus::Rejected);
    body.error = Some(error.to_payload());
    Some(Envelope::response(request_id, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use switchboard_core::ChannelRef;

    fn request(body: RequestBody) -> Envelope {
        Envelope::request("r-1", &body)
    }

    #[test]
    fn connect_normalizes_channel_refs() {
        let env = request(RequestBody {
            channel_id: "sap.ushell.MessageBroker".into(),
            client_id: "F".into(),
            message_name: "connect".into(),
            subscribed_channels: Some(vec![
                ChannelRef::from("a"),
                ChannelRef::Object {
                    channel_id: "b".into(),
                },
            ]),
            ..RequestBody::default()
        });
        assert_matches!(
            BrokerRequest::from_envelope(&env).unwrap(),
            BrokerRequest::Connect { client_id, channels, request_id, .. }
                if client_id == "F" && channels == ["a", "b"] && request_id == "r-1"
        );
    }

    #[test]
    fn other_names_publish() {
        let env = request(RequestBody {
            channel_id: "chan1".into(),
            client_id: "A".into(),
            message_name: "ping".into(),
            target_client_ids: Some(vec!["*".into()]),
            data: json!({"n": 1}),
            ..RequestBody::default()
        });
        let req = BrokerRequest::from_envelope(&env).unwrap();
        assert_eq!(req.name(), "ping");
        assert_eq!(req.client_id(), "A");
        assert_matches!(req, BrokerRequest::Publish(p) if p.message_id == "r-1" && p.target_client_ids == ["*"]);
    }

    #[test]
    fn missing_targets_normalize_to_empty() {
        let env = request(RequestBody {
            channel_id: "chan1".into(),
            client_id: "A".into(),
            message_name: "ping".into(),
            ..RequestBody::default()
        });
        assert_matches!(
            BrokerRequest::from_envelope(&env).unwrap(),
            BrokerRequest::Publish(p) if p.target_client_ids.is_empty()
        );
    }

    #[test]
    fn non_request_envelope_rejected() {
        let env = Envelope::response("r", &ResponseBody::default());
        assert_matches!(
            BrokerRequest::from_envelope(&env),
            Err(BrokerError::InvalidEnvelope(_))
        );
    }

    #[test]
    fn disconnect_acknowledgement_has_no_status() {
        let env = request(RequestBody {
            channel_id: "sap.ushell.MessageBroker".into(),
            client_id: "F".into(),
            message_name: "disconnect".into(),
            ..RequestBody::default()
        });
        let req = BrokerRequest::from_envelope(&env).unwrap();
        let (id, body) = req.acknowledgement().unwrap();
        assert_eq!(id, "r-1");
        assert_eq!(body.correlation_message_id, "r-1");
        assert_eq!(body.message_name, "disconnect");
        assert!(body.status.is_none());
    }

    #[test]
    fn rejection_only_for_connect_and_disconnect() {
        let connect = request(RequestBody {
            client_id: "F".into(),
            message_name: "connect".into(),
            ..RequestBody::default()
        });
        let rejected = rejection(&connect, &BrokerError::AlreadySubscribed("F".into())).unwrap();
        assert_eq!(rejected.body["status"], "rejected");
        assert_eq!(rejected.body["error"]["code"], "ALREADY_SUBSCRIBED");
        assert_eq!(rejected.request_id, "r-1");

        let publish = request(RequestBody {
            client_id: "F".into(),
            message_name: "ping".into(),
            ..RequestBody::default()
        });
        assert!(rejection(&publish, &BrokerError::UnknownChannel("x".into())).is_none());
    }
}
