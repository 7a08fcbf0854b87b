//! A live client connection: the write half of one socket plus close state.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::PeerWriteError;

/// Immutable broadcast payload, shared across one dispatch pass.
pub type Payload = Arc<str>;

/// Upper bound on acquiring the sink and sending the close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Process-unique connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Cosmetic display name in the form `Client<n>`, `n` in `0..100`.
///
/// Not unique; never used as a key.
pub fn display_identity() -> String {
    format!("Client{}", rand::rng().random_range(0..100))
}

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), PeerWriteError>;

    /// Send a close frame and flush.
    async fn close(&mut self) -> Result<(), PeerWriteError>;
}

/// One registered peer as seen by the hub.
///
/// Writes are serialized by the sink mutex. `close` is idempotent: only the
/// first caller touches the transport.
pub struct Connection {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    connected_at: Instant,
    sink: Mutex<Box<dyn FrameSink>>,
    closed: AtomicBool,
    closed_signal: CancellationToken,
}

impl Connection {
    /// Wrap a sink.
    pub fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        sink: impl FrameSink + 'static,
    ) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            sink: Mutex::new(Box::new(sink)),
            closed: AtomicBool::new(false),
            closed_signal: CancellationToken::new(),
        }
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, when the listener recorded one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        self.closed_signal.cancelled().await;
    }

    /// Write one text frame.
    pub async fn send(&self, text: &str) -> Result<(), PeerWriteError> {
        if self.is_closed() {
            return Err(PeerWriteError::Closed);
        }
        let mut sink = self.sink.lock().await;
        // closed while queued behind another writer
        if self.is_closed() {
            return Err(PeerWriteError::Closed);
        }
        sink.send_text(text).await
    }

    /// Close the transport. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed_signal.cancel();

        let shutdown = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, shutdown).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(conn_id = %self.id, %error, "close frame not sent"),
            Err(_) => debug!(conn_id = %self.id, "close timed out"),
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
