//! Frame connections: origin-gated upgrade, session lifecycle, inbound dispatch.

pub mod connection;
pub mod frames;
pub mod handler;
pub mod session;
pub mod upgrade;
