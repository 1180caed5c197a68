//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Each type implements
//! [`Default`] with production values, and `#[serde(default)]` lets a
//! settings file name only the fields it changes.

mod broker;
mod logging;
mod server;

pub use broker::*;
pub use logging::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9500 },
///   "broker": { "requestTimeoutMs": 30000, "acceptedOrigins": ["https://app.example"] }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Frame bridge network settings.
    pub server: ServerSettings,
    /// Broker engine settings.
    pub broker: BrokerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl SwitchboardSettings {
    /// Correct out-of-range values in place.
    ///
    /// Called during loading. Invalid values are replaced with a warning
    /// rather than rejected.
    pub fn validate(&mut self) {
        if !self.server.path.starts_with('/') {
            let fixed = format!("/{}", self.server.path);
            tracing::warn!(path = %self.server.path, %fixed, "websocket path must be absolute");
            self.server.path = fixed;
        }
        if self.server.outbound_queue == 0 {
            tracing::warn!("outboundQueue must be at least 1, using 1");
            self.server.outbound_queue = 1;
        }
        if self.broker.request_timeout_ms == Some(0) {
            tracing::warn!("requestTimeoutMs of 0 disables the timeout");
            self.broker.request_timeout_ms = None;
        }
        self.broker.accepted_origins.retain(|o| !o.is_empty());
    }
}
