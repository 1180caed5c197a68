//! # switchboard-server
//!
//! Axum HTTP + `WebSocket` gateway in front of the message broker.
//!
//! Each `WebSocket` connection stands in for one embedded frame: text or
//! binary frames carry broker envelopes in, and the broker's answers,
//! relayed replies and connection events flow back out over the same
//! socket.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `server` | [`server::SwitchboardServer`]: router, shared state, listener |
//! | `routes` | HTTP handlers for health, metrics, clients and origins |
//! | `websocket` | Origin-gated upgrade, frame sessions, inbound dispatch |
//! | `health` | `/health` response body |
//! | `metrics` | Prometheus recorder and metric names |
//! | `shutdown` | [`shutdown::ShutdownCoordinator`] |
//! | `errors` | [`errors::ServerError`] |
//!
//! ## Crate Position
//!
//! Depends on: switchboard-core, switchboard-settings, switchboard-broker.
//! Depended on by: switchboard.

#![deny(unsafe_code)]

pub mod errors;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use errors::ServerError;
pub use server::{AppState, SwitchboardServer};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
