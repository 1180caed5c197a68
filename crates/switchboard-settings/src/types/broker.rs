//! Broker engine settings.

use serde::{Deserialize, Serialize};

/// Settings for the message broker engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// How long a publish waits for an embedded client's reply.
    ///
    /// `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
    /// Origins seeded into the allowlist at startup.
    pub accepted_origins: Vec<String>,
}
