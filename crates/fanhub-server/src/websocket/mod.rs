//! WebSocket admission, per-connection sessions and the heartbeat source.

pub mod admission;
pub mod heartbeat;
pub mod peer;
pub mod session;
