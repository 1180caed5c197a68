//! Inbound frame dispatch: parse an envelope and hand it to the broker.
//!
//! Publishes run on their own task because routing to another embedded
//! frame waits for that frame's response, which arrives on a different
//! socket. Everything else is handled inline so a frame's `connect`
//! always takes effect before the messages it sends afterwards.

use std::sync::Arc;

use switchboard_broker::request::rejection;
use switchboard_broker::{
    BrokerRequest, FramePort, InboundMessage, MessageBroker, PostMessageOutcome,
};
use switchboard_core::Envelope;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, instrument, warn};

use super::connection::FrameConnection;

/// Handle one inbound text frame.
///
/// Returns the spawned task when the envelope is a publish.
#[instrument(skip_all, fields(frame_id = %connection.id))]
pub async fn handle_frame(
    text: &str,
    connection: &Arc<FrameConnection>,
    broker: &Arc<MessageBroker>,
) -> Option<JoinHandle<()>> {
    let envelope = match Envelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, len = text.len(), "dropping malformed frame");
            return None;
        }
    };

    if is_publish(&envelope) {
        let connection = Arc::clone(connection);
        let broker = Arc::clone(broker);
        let task = async move { dispatch(envelope, &connection, &broker).await };
        Some(tokio::spawn(task.in_current_span()))
    } else {
        dispatch(envelope, connection, broker).await;
        None
    }
}

fn is_publish(envelope: &Envelope) -> bool {
    envelope.is_broker_service()
        && matches!(
            BrokerRequest::from_envelope(envelope),
            Ok(BrokerRequest::Publish(_))
        )
}

async fn dispatch(envelope: Envelope, connection: &Arc<FrameConnection>, broker: &MessageBroker) {
    let source: Arc<dyn FramePort> = connection.clone();
    let inbound = InboundMessage {
        envelope: envelope.clone(),
        source: Some(source),
        origin: connection.origin.clone(),
    };
    match broker.process_post_message(inbound).await {
        Ok(PostMessageOutcome::Connected { client_id }) => connection.track_client(&client_id),
        Ok(PostMessageOutcome::Disconnected { client_id }) => connection.untrack_client(&client_id),
        Ok(PostMessageOutcome::Published(report)) => debug!(
            delivered = report.delivered.len(),
            replies = report.replies.len(),
            "publish routed"
        ),
        Ok(PostMessageOutcome::Resolved {
            client_id,
            request_id,
        }) => debug!(%client_id, %request_id, "response correlated"),
        Ok(PostMessageOutcome::Ignored) => {}
        Err(e) => match rejection(&envelope, &e) {
            Some(rejected) => {
                debug!(code = e.code(), "rejecting request");
                if let Err(post_err) = connection.post(&rejected, &connection.origin) {
                    warn!(error = %post_err, "failed to post rejection");
                }
            }
            None => warn!(code = e.code(), error = %e, "frame message failed"),
        },
    }
}
