//! HTTP handlers: health, metrics, registry snapshot, origin management.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use switchboard_core::BrokerError;
use tracing::info;

use crate::health::{self, HealthResponse};
use crate::server::AppState;

/// Body of `POST /origins` and `DELETE /origins`.
#[derive(Debug, Deserialize)]
pub struct OriginRequest {
    /// Origin to add or remove.
    pub origin: String,
}

/// Body returned by the `/origins` routes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginsResponse {
    /// Accepted origins after the call.
    pub accepted_origins: Vec<String>,
    /// Whether the call changed the allowlist. Absent on `GET`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.frames.len(),
        state.broker.active_client_count(),
        state.broker.pending_request_count(),
    ))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

/// `GET /clients`: channel id to subscriber snapshots.
pub async fn clients(State(state): State<AppState>) -> Response {
    Json(state.broker.connected_clients()).into_response()
}

/// `GET /origins`
pub async fn list_origins(State(state): State<AppState>) -> Json<OriginsResponse> {
    Json(OriginsResponse {
        accepted_origins: state.broker.accepted_origins(),
        changed: None,
    })
}

/// `POST /origins`: 201 when added, 200 when already present.
pub async fn add_origin(
    State(state): State<AppState>,
    Json(req): Json<OriginRequest>,
) -> Response {
    match state.broker.add_accepted_origin(&req.origin) {
        Ok(added) => {
            if added {
                info!(origin = %req.origin, "origin accepted");
            }
            let status = if added { StatusCode::CREATED } else { StatusCode::OK };
            let body = OriginsResponse {
                accepted_origins: state.broker.accepted_origins(),
                changed: Some(added),
            };
            (status, Json(body)).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
    }
}

/// `DELETE /origins`
pub async fn remove_origin(
    State(state): State<AppState>,
    Json(req): Json<OriginRequest>,
) -> Json<OriginsResponse> {
    let removed = state.broker.remove_accepted_origin(&req.origin);
    if removed {
        info!(origin = %req.origin, "origin no longer accepted");
    }
    Json(OriginsResponse {
        accepted_origins: state.broker.accepted_origins(),
        changed: Some(removed),
    })
}

fn error_response(status: StatusCode, error: &BrokerError) -> Response {
    (status, Json(serde_json::json!({ "error": error.to_payload() }))).into_response()
}
