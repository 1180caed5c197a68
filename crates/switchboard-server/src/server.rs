//! `SwitchboardServer`: Axum HTTP + `WebSocket` gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use switchboard_broker::MessageBroker;
use switchboard_settings::ServerSettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::errors::ServerError;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::frames::FrameSet;
use crate::websocket::upgrade::ws_handler;

/// Paths served over plain HTTP; the `WebSocket` path may not reuse them.
const HTTP_PATHS: [&str; 4] = ["/health", "/metrics", "/clients", "/origins"];

/// Fallback `WebSocket` path.
const DEFAULT_WS_PATH: &str = "/ws";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broker every frame talks to.
    pub broker: Arc<MessageBroker>,
    /// Open frame connections.
    pub frames: Arc<FrameSet>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Listener and session settings.
    pub settings: Arc<ServerSettings>,
    /// Prometheus handle backing `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The frame gateway.
pub struct SwitchboardServer {
    settings: Arc<ServerSettings>,
    broker: Arc<MessageBroker>,
    frames: Arc<FrameSet>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl SwitchboardServer {
    /// Create a new server.
    pub fn new(
        settings: ServerSettings,
        broker: Arc<MessageBroker>,
        metrics: PrometheusHandle,
    ) -> Self {
        let frames = Arc::new(FrameSet::new());
        let shutdown = Arc::new(ShutdownCoordinator::new(broker.clone(), frames.clone()));
        Self {
            settings: Arc::new(settings),
            broker,
            frames,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: self.broker.clone(),
            frames: self.frames.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            settings: self.settings.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/clients", get(routes::clients))
            .route(
                "/origins",
                get(routes::list_origins)
                    .post(routes::add_origin)
                    .delete(routes::remove_origin),
            )
            .route(self.ws_path(), get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// The `WebSocket` path, falling back to `/ws` when the configured
    /// one is not absolute or collides with an HTTP route.
    pub fn ws_path(&self) -> &str {
        let path = self.settings.path.as_str();
        if path.len() > 1 && path.starts_with('/') && !HTTP_PATHS.contains(&path) {
            path
        } else {
            warn!(path, fallback = DEFAULT_WS_PATH, "unusable websocket path");
            DEFAULT_WS_PATH
        }
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        info!(%local_addr, ws_path = self.ws_path(), "switchboard listening");

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the broker.
    pub fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    /// Get the open frame connections.
    pub fn frames(&self) -> &Arc<FrameSet> {
        &self.frames
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}
