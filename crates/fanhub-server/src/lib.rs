//! # fanhub-server
//!
//! Real-time fan-out over WebSocket.
//!
//! - [`hub::Registry`]: lock-guarded set of live connections
//! - [`hub::Hub`]: intake queue plus a single dispatcher that writes each
//!   message to every connection with per-write timeouts and fault isolation
//! - `/ws` admission against a shared `API-KEY` secret, one peer driver per
//!   connection, optional heartbeat broadcasts
//! - `/health` and `/metrics` endpoints
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use config::{HeartbeatConfig, ServerConfig};
pub use errors::{AdmissionError, HubError, PeerReadError, PeerWriteError, RegistryError, StartupError};
pub use hub::{Connection, ConnectionId, FrameSink, Hub, HubConfig, HubStats, Payload};
pub use server::HubServer;
