//! Identifier generation for broker-originated envelopes and frame sessions.

use uuid::Uuid;

/// Request id for an `event` envelope (`evt_<uuidv7>`).
pub fn generate_event_id() -> String {
    format!("evt_{}", Uuid::now_v7())
}

/// Request id for an in-process publish that did not supply one.
pub fn generate_request_id() -> String {
    format!("req_{}", Uuid::now_v7())
}

/// Connection id for a WebSocket frame session (`frame_<uuidv7>`).
pub fn generate_frame_id() -> String {
    format!("frame_{}", Uuid::now_v7())
}
