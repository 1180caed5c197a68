//! Wire-level constants shared by the broker and the frame bridge.

/// Service identifier stamped on every envelope.
pub const SERVICE_NAME: &str = "sap.ushell.services.MessageBroker";

/// Channel id carried by connection events.
pub const BROKER_CHANNEL_ID: &str = "sap.ushell.MessageBroker";

/// Inbound message name that subscribes the sender.
pub const CONNECT: &str = "connect";

/// Inbound message name that unsubscribes the sender.
pub const DISCONNECT: &str = "disconnect";

/// Target id that selects every subscriber of a channel.
pub const WILDCARD_TARGET: &str = "*";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_distinct() {
        assert_ne!(CONNECT, DISCONNECT);
        assert_ne!(SERVICE_NAME, BROKER_CHANNEL_ID);
    }
}
