//! Transport for embedded frames reached through `postMessage`.
//!
//! A forwarded publish becomes a `request` envelope posted to the frame.
//! The frame answers with a `response` envelope carrying its client id and
//! the same request id; the broker's inbound path resolves the matching
//! [`PendingRequests`] entry, which completes [`Transport::request`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use switchboard_core::{
    BrokerError, Envelope, EventBody, RequestBody, ResponseBody, Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Delivery, Transport, TransportKind, non_null};
use crate::endpoint::{ConnectionChange, FramePort};
use crate::pending::PendingRequests;

/// Posts envelopes to one embedded frame.
pub struct PostMessageTransport {
    client_id: String,
    port: Arc<dyn FramePort>,
    origin: String,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl PostMessageTransport {
    /// Transport for `client_id` behind `port`.
    ///
    /// Outstanding requests are abandoned when `cancel` fires. With
    /// `timeout` unset a silent frame keeps its publish pending.
    pub fn new(
        client_id: impl Into<String>,
        port: Arc<dyn FramePort>,
        origin: impl Into<String>,
        pending: Arc<PendingRequests>,
        cancel: CancellationToken,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            port,
            origin: origin.into(),
            pending,
            cancel,
            timeout,
        }
    }

    fn post(&self, envelope: &Envelope) -> Result<()> {
        if !self.port.is_open() {
            return Err(BrokerError::transport(&self.client_id, "frame is gone"));
        }
        self.port.post(envelope, &self.origin)
    }

    async fn await_response(
        &self,
        rx: tokio::sync::oneshot::Receiver<ResponseBody>,
        entry: &mut PendingEntry<'_>,
    ) -> Result<ResponseBody> {
        let token = self.cancel.child_token();
        tokio::select! {
            res = rx => {
                // Resolved, dropped or replaced: the entry is no longer ours.
                entry.disarm();
                res.map_err(|_| BrokerError::transport(&self.client_id, "request cancelled"))
            }
            () = token.cancelled() => {
                Err(BrokerError::transport(&self.client_id, "broker shutting down"))
            }
            () = expire(self.timeout) => {
                Err(BrokerError::Timeout {
                    client_id: self.client_id.clone(),
                    request_id: entry.request_id.to_string(),
                    timeout_ms: timeout_ms(self.timeout),
                })
            }
        }
    }
}

/// Removes a registered request from [`PendingRequests`] when dropped,
/// unless the response channel already settled it.
struct PendingEntry<'a> {
    pending: &'a PendingRequests,
    client_id: &'a str,
    request_id: &'a str,
    armed: bool,
}

impl<'a> PendingEntry<'a> {
    fn new(pending: &'a PendingRequests, client_id: &'a str, request_id: &'a str) -> Self {
        Self {
            pending,
            client_id,
            request_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.pending.remove(self.client_id, self.request_id);
        }
    }
}

fn timeout_ms(timeout: Option<Duration>) -> u64 {
    timeout.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Transport for PostMessageTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PostMessage
    }

    fn origin(&self) -> Option<&str> {
        Some(&self.origin)
    }

    async fn request(&self, delivery: &Delivery) -> Result<Option<Value>> {
        let envelope = Envelope::request(
            &delivery.message_id,
            &RequestBody {
                channel_id: delivery.channel_id.clone(),
                client_id: delivery.sender_id.clone(),
                message_name: delivery.message_name.clone(),
                data: delivery.data.clone(),
                ..RequestBody::default()
            },
        );

        let rx = self.pending.register(&self.client_id, &delivery.message_id);
        let mut entry = PendingEntry::new(&self.pending, &self.client_id, &delivery.message_id);
        self.post(&envelope)?;
        debug!(
            client_id = %self.client_id,
            request_id = %delivery.message_id,
            "request posted, awaiting response"
        );

        let response = self.await_response(rx, &mut entry).await?;
        Ok(non_null(Some(response.data)))
    }

    async fn reply(&self, responder_id: &str, delivery: &Delivery, data: Value) -> Result<()> {
        let envelope = Envelope::response(
            &delivery.message_id,
            &ResponseBody {
                channel_id: delivery.channel_id.clone(),
                client_id: responder_id.to_string(),
                correlation_message_id: delivery.message_id.clone(),
                message_name: delivery.message_name.clone(),
                data,
                ..ResponseBody::default()
            },
        );
        self.post(&envelope)
    }

    async fn notify(&self, change: &ConnectionChange) -> Result<()> {
        let envelope = Envelope::event(&EventBody::new(
            change.kind,
            &change.client_id,
            change.subscribed_channels.clone(),
            change.data.clone(),
        ));
        self.post(&envelope).inspect_err(|e| {
            warn!(client_id = %self.client_id, error = %e, "event post failed");
        })
    }
}
