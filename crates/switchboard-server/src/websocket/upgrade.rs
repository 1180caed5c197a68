//! Origin-gated `WebSocket` upgrade.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use switchboard_core::ids::generate_frame_id;
use tokio::sync::mpsc;
use tracing::warn;

use super::connection::FrameConnection;
use super::session::{SessionContext, run_frame_session};
use crate::metrics::FRAME_ORIGIN_REJECTIONS_TOTAL;
use crate::server::AppState;

/// `GET <ws path>`: upgrade when the `Origin` header is accepted, 403 otherwise.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = request_origin(&headers);
    if !state.broker.is_origin_accepted(&origin) {
        counter!(FRAME_ORIGIN_REJECTIONS_TOTAL).increment(1);
        warn!(%origin, "rejecting upgrade from unaccepted origin");
        return (StatusCode::FORBIDDEN, "origin not accepted").into_response();
    }

    let settings = &state.settings;
    let (tx, rx) = mpsc::channel(settings.outbound_queue.max(1));
    let connection = Arc::new(FrameConnection::new(generate_frame_id(), origin, tx));
    let ctx = SessionContext {
        broker: state.broker.clone(),
        frames: state.frames.clone(),
        ping_interval: Duration::from_millis(settings.ping_interval_ms.max(1)),
        shutdown: state.shutdown.token(),
    };
    ws.max_message_size(settings.max_message_size)
        .on_upgrade(move |socket| run_frame_session(socket, connection, rx, ctx))
}

/// The request's `Origin` header, or `""` when absent or not ASCII.
pub fn request_origin(headers: &HeaderMap) -> String {
    headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn origin_header_is_read() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers), "");
        let _ = headers.insert(header::ORIGIN, HeaderValue::from_static("https://a.example"));
        assert_eq!(request_origin(&headers), "https://a.example");
    }
}
