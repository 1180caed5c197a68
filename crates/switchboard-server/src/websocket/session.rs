//! Frame session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use switchboard_broker::MessageBroker;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

use super::connection::FrameConnection;
use super::frames::FrameSet;
use super::handler::handle_frame;
use crate::metrics::{
    FRAME_CONNECTION_DURATION_SECONDS, FRAME_CONNECTIONS_ACTIVE, FRAME_CONNECTIONS_TOTAL,
    FRAME_ORIGIN_REJECTIONS_TOTAL,
};

/// Shared collaborators of every frame session.
#[derive(Clone)]
pub struct SessionContext {
    /// The broker envelopes are handed to.
    pub broker: Arc<MessageBroker>,
    /// Open connections, for health reporting.
    pub frames: Arc<FrameSet>,
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Run a session for one embedded frame.
///
/// 1. Forwards queued envelopes to the socket and pings periodically
/// 2. Rechecks the frame's origin on every inbound message
/// 3. Dispatches inbound envelopes to the broker
/// 4. Unsubscribes every client id the frame connected once it closes
#[instrument(skip_all, fields(frame_id = %connection.id, origin = %connection.origin))]
pub async fn run_frame_session(
    ws: WebSocket,
    connection: Arc<FrameConnection>,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    ctx: SessionContext,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let connection_start = Instant::now();
    info!("frame connected");
    counter!(FRAME_CONNECTIONS_TOTAL).increment(1);
    gauge!(FRAME_CONNECTIONS_ACTIVE).increment(1.0);
    ctx.frames.add(connection.clone());

    // Ends the read loop when the writer stops, and vice versa on shutdown.
    let session = ctx.shutdown.child_token();
    let writer_guard = session.clone().drop_guard();
    let pong_timeout = ctx.ping_interval * 2;
    let ping_interval = ctx.ping_interval;
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(
        async move {
            let _guard = writer_guard;
            let mut ping = tokio::time::interval(ping_interval);
            let _ = ping.tick().await;

            loop {
                tokio::select! {
                    msg = send_rx.recv() => {
                        let Some(text) = msg else { break };
                        if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ping.tick() => {
                        if !outbound_conn.check_alive()
                            && outbound_conn.last_pong_elapsed() > pong_timeout
                        {
                            warn!("frame unresponsive for {pong_timeout:?}, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx.close().await;
        }
        .in_current_span(),
    );

    loop {
        let msg = tokio::select! {
            () = session.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(msg)) => msg,
                _ => break,
            },
        };
        let text = match msg {
            Message::Text(t) => Some(t.to_string()),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    Some(s.to_string())
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                info!("frame sent close");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };
        connection.mark_alive();

        if !ctx.broker.is_origin_accepted(&connection.origin) {
            counter!(FRAME_ORIGIN_REJECTIONS_TOTAL).increment(1);
            warn!("origin no longer accepted, dropping message");
            continue;
        }
        let _ = handle_frame(&text, &connection, &ctx.broker).await;
    }

    outbound.abort();
    let _ = ctx.frames.remove(&connection.id);
    for client_id in connection.take_clients() {
        match ctx.broker.unsubscribe(&client_id).await {
            Ok(()) => debug!(%client_id, "unsubscribed on close"),
            Err(e) => debug!(%client_id, error = %e, "client already gone"),
        }
    }

    gauge!(FRAME_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(FRAME_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    info!(dropped = connection.drop_count(), "frame disconnected");
}
