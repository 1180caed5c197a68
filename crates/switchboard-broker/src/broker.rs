//! The [`MessageBroker`] facade.
//!
//! One explicit instance per process, shared as `Arc<MessageBroker>`.
//! In-process clients call [`MessageBroker::subscribe`],
//! [`MessageBroker::unsubscribe`] and [`MessageBroker::publish`] directly.
//! Embedded frames reach the same operations through
//! [`MessageBroker::process_post_message`].

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use metrics::{counter, gauge};
use serde_json::Value;
use switchboard_core::ids::generate_request_id;
use switchboard_core::{
    ActiveClient, BrokerError, ConnectionEventKind, Envelope, EnvelopeType, ResponseStatus, Result,
};
use switchboard_settings::BrokerSettings;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::endpoint::{ClientEndpoint, ConnectionChange, FramePort};
use crate::notifier::notify_peers;
use crate::origins::OriginAllowlist;
use crate::pending::PendingRequests;
use crate::registry::{ClientRegistry, ClientSnapshot};
use crate::request::BrokerRequest;
use crate::router::{self, PublishReport, PublishRequest};
use crate::transport::{InProcessTransport, PostMessageTransport, Transport};

/// Engine configuration.
#[derive(Clone, Debug, Default)]
pub struct BrokerConfig {
    /// How long a publish waits for an embedded client's reply.
    /// `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Origins accepted from the start.
    pub accepted_origins: Vec<String>,
}

impl From<&BrokerSettings> for BrokerConfig {
    fn from(settings: &BrokerSettings) -> Self {
        Self {
            request_timeout: settings.request_timeout_ms.map(Duration::from_millis),
            accepted_origins: settings.accepted_origins.clone(),
        }
    }
}

/// An inbound `postMessage` event.
#[derive(Clone)]
pub struct InboundMessage {
    /// Parsed envelope.
    pub envelope: Envelope,
    /// The frame that sent it; answers are posted back here.
    pub source: Option<Arc<dyn FramePort>>,
    /// Origin of the sending frame.
    pub origin: String,
}

/// What [`MessageBroker::process_post_message`] did with a message.
#[derive(Clone, Debug, PartialEq)]
pub enum PostMessageOutcome {
    /// The frame subscribed under `client_id`.
    Connected {
        /// Registered client id.
        client_id: String,
    },
    /// The frame unsubscribed `client_id`.
    Disconnected {
        /// Removed client id.
        client_id: String,
    },
    /// A publish was routed.
    Published(PublishReport),
    /// A response completed a pending request.
    Resolved {
        /// Responding client.
        client_id: String,
        /// Correlation id.
        request_id: String,
    },
    /// Not addressed to the broker, or an event.
    Ignored,
}

/// Cross-context message broker.
pub struct MessageBroker {
    registry: ClientRegistry,
    origins: OriginAllowlist,
    pending: Arc<PendingRequests>,
    request_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl MessageBroker {
    /// Create a broker.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            registry: ClientRegistry::new(),
            origins: OriginAllowlist::with_origins(config.accepted_origins),
            pending: Arc::new(PendingRequests::new()),
            request_timeout: config.request_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Subscribe `client_id` to `channels`.
    ///
    /// Returns the clients that were active before this call. Every other
    /// connected client is told about the new connection.
    #[instrument(skip_all, fields(client_id = %client_id))]
    pub async fn subscribe(
        &self,
        client_id: &str,
        channels: &[String],
        data: Value,
        endpoint: ClientEndpoint,
    ) -> Result<Vec<ActiveClient>> {
        let transport = self.transport_for(client_id, endpoint)?;
        let (previous, subscription) = self.registry.insert(client_id, channels, data, transport)?;

        counter!("broker_subscriptions_total").increment(1);
        gauge!("broker_clients_active").set(self.registry.active_count() as f64);
        info!(
            channels = ?subscription.subscribed_channels,
            in_process = subscription.is_in_process(),
            "client subscribed"
        );

        if self.registry.active_count() > 1 {
            let change = ConnectionChange {
                kind: ConnectionEventKind::Connected,
                client_id: subscription.client_id.clone(),
                subscribed_channels: subscription.subscribed_channels.clone(),
                data: subscription.data.clone(),
            };
            let peers = self.registry.peers_of(client_id);
            let notified = notify_peers(&peers, &change).await;
            debug!(notified, "connection broadcast");
        }
        Ok(previous)
    }

    /// Unsubscribe `client_id` and tell the remaining clients.
    ///
    /// Pending requests addressed to the client fail.
    #[instrument(skip_all, fields(client_id = %client_id))]
    pub async fn unsubscribe(&self, client_id: &str) -> Result<()> {
        let subscription = self.registry.remove(client_id)?;
        let dropped = self.pending.drop_client(client_id);
        gauge!("broker_clients_active").set(self.registry.active_count() as f64);
        info!(dropped_requests = dropped, "client unsubscribed");

        let change = ConnectionChange {
            kind: ConnectionEventKind::Disconnected,
            client_id: subscription.client_id.clone(),
            subscribed_channels: subscription.subscribed_channels.clone(),
            data: subscription.data.clone(),
        };
        let peers = self.registry.peers_of(client_id);
        let _ = notify_peers(&peers, &change).await;
        Ok(())
    }

    fn transport_for(&self, client_id: &str, endpoint: ClientEndpoint) -> Result<Arc<dyn Transport>> {
        match endpoint {
            ClientEndpoint::InProcess {
                on_message,
                on_connection,
            } => {
                let on_message = on_message.ok_or(BrokerError::MissingParameter("onMessage"))?;
                let on_connection =
                    on_connection.ok_or(BrokerError::MissingParameter("onConnection"))?;
                Ok(Arc::new(InProcessTransport::new(
                    client_id,
                    on_message,
                    on_connection,
                )))
            }
            ClientEndpoint::Frame { port, origin } => Ok(Arc::new(PostMessageTransport::new(
                client_id,
                port,
                origin,
                Arc::clone(&self.pending),
                self.shutdown.clone(),
                self.request_timeout,
            ))),
        }
    }

    // ── Publish ─────────────────────────────────────────────────────

    /// Publish a message on a channel.
    ///
    /// An empty `message_id` is replaced with a generated one so replies
    /// stay correlatable.
    #[instrument(
        skip_all,
        fields(
            channel_id = %request.channel_id,
            client_id = %request.sender_id,
            request_id = %request.message_id,
        )
    )]
    pub async fn publish(&self, mut request: PublishRequest) -> Result<PublishReport> {
        if request.message_id.is_empty() {
            request.message_id = generate_request_id();
        }
        counter!("broker_publishes_total").increment(1);
        match router::publish(&self.registry, request).await {
            Ok(report) => {
                debug!(
                    delivered = report.delivered.len(),
                    replies = report.replies.len(),
                    "publish complete"
                );
                Ok(report)
            }
            Err(e) => {
                counter!("broker_publish_errors_total", "code" => e.code()).increment(1);
                warn!(error = %e, "publish failed");
                Err(e)
            }
        }
    }

    // ── postMessage ingress ─────────────────────────────────────────

    /// Handle one inbound `postMessage` event from an embedded frame.
    ///
    /// Connect and disconnect always answer the source frame. A publish
    /// answers only through the targets' replies; its failures are
    /// returned to the caller and never posted.
    #[instrument(
        skip_all,
        fields(request_id = %inbound.envelope.request_id, origin = %inbound.origin)
    )]
    pub async fn process_post_message(&self, inbound: InboundMessage) -> Result<PostMessageOutcome> {
        let InboundMessage {
            envelope,
            source,
            origin,
        } = inbound;
        if !envelope.is_broker_service() {
            debug!(service = %envelope.service, "ignoring envelope for another service");
            return Ok(PostMessageOutcome::Ignored);
        }
        let source = source.ok_or(BrokerError::MissingFrame)?;

        match envelope.kind {
            EnvelopeType::Event => Ok(PostMessageOutcome::Ignored),
            EnvelopeType::Response => self.resolve_response(&envelope),
            EnvelopeType::Request => {
                let request = BrokerRequest::from_envelope(&envelope)?;
                self.dispatch(request, source, origin).await
            }
        }
    }

    fn resolve_response(&self, envelope: &Envelope) -> Result<PostMessageOutcome> {
        let body = envelope.response_body()?;
        let client_id = body.client_id.clone();
        let request_id = if body.correlation_message_id.is_empty() {
            envelope.request_id.clone()
        } else {
            body.correlation_message_id.clone()
        };
        if self.pending.resolve(&client_id, &request_id, body) {
            Ok(PostMessageOutcome::Resolved {
                client_id,
                request_id,
            })
        } else {
            Err(BrokerError::transport(
                client_id,
                format!("no pending request '{request_id}'"),
            ))
        }
    }

    async fn dispatch(
        &self,
        request: BrokerRequest,
        source: Arc<dyn FramePort>,
        origin: String,
    ) -> Result<PostMessageOutcome> {
        match &request {
            BrokerRequest::Connect {
                client_id,
                channels,
                data,
                ..
            } => {
                let endpoint = ClientEndpoint::frame(Arc::clone(&source), origin.clone());
                let previous = self
                    .subscribe(client_id, channels, data.clone(), endpoint)
                    .await?;
                if let Some((request_id, mut body)) = request.acknowledgement() {
                    body.active_clients = Some(previous);
                    body.status = Some(ResponseStatus::Accepted);
                    answer(&source, &Envelope::response(request_id, &body), &origin);
                }
                Ok(PostMessageOutcome::Connected {
                    client_id: client_id.clone(),
                })
            }
            BrokerRequest::Disconnect { client_id, .. } => {
                self.unsubscribe(client_id).await?;
                if let Some((request_id, body)) = request.acknowledgement() {
                    answer(&source, &Envelope::response(request_id, &body), &origin);
                }
                Ok(PostMessageOutcome::Disconnected {
                    client_id: client_id.clone(),
                })
            }
            BrokerRequest::Publish(publish) => {
                let report = self.publish(publish.clone()).await?;
                Ok(PostMessageOutcome::Published(report))
            }
        }
    }

    // ── Origins ─────────────────────────────────────────────────────

    /// Accept an origin. Returns `false` if it was already accepted.
    pub fn add_accepted_origin(&self, origin: &str) -> Result<bool> {
        self.origins.add(origin)
    }

    /// Stop accepting an origin. Returns `false` if it was not present.
    pub fn remove_accepted_origin(&self, origin: &str) -> bool {
        self.origins.remove(origin)
    }

    /// Accepted origins in insertion order.
    pub fn accepted_origins(&self) -> Vec<String> {
        self.origins.list()
    }

    /// Whether `origin` is accepted.
    pub fn is_origin_accepted(&self, origin: &str) -> bool {
        self.origins.is_accepted(origin)
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Deep snapshot of the channel registry.
    pub fn connected_clients(&self) -> IndexMap<String, Vec<ClientSnapshot>> {
        self.registry.snapshot()
    }

    /// Active clients in subscription order.
    pub fn active_clients(&self) -> Vec<ActiveClient> {
        self.registry.active_clients()
    }

    /// Number of active clients.
    pub fn active_client_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Whether `client_id` is active.
    pub fn is_subscribed(&self, client_id: &str) -> bool {
        self.registry.is_active(client_id)
    }

    /// Number of correlated requests awaiting a frame's response.
    pub fn pending_request_count(&self) -> usize {
        self.pending.pending_count()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Cancel every outstanding correlated request.
    pub fn shutdown(&self) {
        let pending = self.pending.pending_count();
        self.shutdown.cancel();
        self.pending.cancel_all();
        info!(pending, "broker shut down");
    }

    /// Whether [`MessageBroker::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for MessageBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

fn answer(source: &Arc<dyn FramePort>, envelope: &Envelope, origin: &str) {
    if let Err(e) = source.post(envelope, origin) {
        warn!(error = %e, "failed to post answer to source frame");
    }
}
