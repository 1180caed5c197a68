//! # switchboard-core
//!
//! Shared vocabulary for the switchboard message broker.
//!
//! - **Envelopes**: [`envelope::Envelope`] with typed `request`, `response`
//!   and `event` bodies, matching the `postMessage` wire format
//! - **Errors**: [`errors::BrokerError`] via `thiserror`, with stable wire codes
//! - **Constants**: service name, broker channel, reserved message names
//! - **IDs**: generated request ids for broker-originated envelopes
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other switchboard crates.

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;

pub use envelope::{
    ActiveClient, ChannelRef, ConnectionEventKind, Envelope, EnvelopeType, ErrorPayload,
    EventBody, RequestBody, ResponseBody, ResponseStatus,
};
pub use errors::{BrokerError, Result};
pub use logging::LogFormat;
