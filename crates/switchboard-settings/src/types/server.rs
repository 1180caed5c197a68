//! Frame bridge network settings.

use serde::{Deserialize, Serialize};

/// WebSocket gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks an ephemeral port.
    pub port: u16,
    /// Route for frame WebSocket upgrades.
    pub path: String,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity per frame connection.
    pub outbound_queue: usize,
    /// Interval between keepalive pings, in milliseconds.
    pub ping_interval_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9400,
            path: "/ws".to_string(),
            max_message_size: 1024 * 1024,
            outbound_queue: 256,
            ping_interval_ms: 30_000,
        }
    }
}
