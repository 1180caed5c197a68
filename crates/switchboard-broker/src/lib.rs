//! # switchboard-broker
//!
//! The cross-context message broker engine. Independent clients, either
//! in-process callbacks or embedded frames reached through `postMessage`,
//! subscribe to named channels and exchange request/response and event
//! messages through one [`MessageBroker`] instance.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `broker` | [`MessageBroker`] facade: subscribe, unsubscribe, publish, `process_post_message` |
//! | `endpoint` | Client-facing traits ([`MessageHandler`], [`ConnectionHandler`], [`FramePort`]) |
//! | `registry` | Channel → subscriber lists and the active-client map |
//! | `origins` | Accepted-origin allowlist for embedded clients |
//! | `transport` | [`Transport`] contract with in-process and postMessage implementations |
//! | `pending` | Correlation of outstanding postMessage requests |
//! | `router` | Target resolution and fan-out for publish |
//! | `notifier` | `clientConnected` / `clientDisconnected` broadcast |
//! | `request` | [`BrokerRequest`] normalization of inbound envelopes |
//!
//! ## Crate Position
//!
//! Depends on: switchboard-core, switchboard-settings.
//! Depended on by: switchboard-server, switchboard.

#![deny(unsafe_code)]

pub mod broker;
pub mod endpoint;
pub mod notifier;
pub mod origins;
pub mod pending;
pub mod registry;
pub mod request;
pub mod router;
pub mod transport;

pub use broker::{BrokerConfig, InboundMessage, MessageBroker, PostMessageOutcome};
pub use endpoint::{
    ClientEndpoint, ClientMessage, ConnectionChange, ConnectionHandler, FramePort, HandlerError,
    MessageHandler,
};
pub use origins::OriginAllowlist;
pub use registry::{ClientRegistry, ClientSnapshot, ClientSubscription};
pub use request::BrokerRequest;
pub use router::{PublishReply, PublishReport, PublishRequest};
pub use transport::{Delivery, Transport, TransportKind};
