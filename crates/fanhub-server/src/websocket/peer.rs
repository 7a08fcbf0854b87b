//! Per-connection read loop.

use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tracing::{debug, info};

use crate::errors::PeerReadError;
use crate::hub::{Connection, Hub};

/// Transport-neutral inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping (answered by the transport).
    Ping,
    /// Pong.
    Pong,
    /// Close frame, with the peer's reason if any.
    Close(Option<String>),
}

impl From<Message> for InboundFrame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data.to_vec()),
            Message::Ping(_) => Self::Ping,
            Message::Pong(_) => Self::Pong,
            Message::Close(frame) => Self::Close(frame.map(|f| f.reason.as_str().to_owned())),
        }
    }
}

/// Lifecycle of a peer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Reading frames.
    Active,
    /// Retiring the connection.
    Closing,
    /// Done.
    Terminated,
}

/// Why a peer driver ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerExit {
    /// The peer sent a close frame.
    ClosedByPeer,
    /// The stream ended without a close frame.
    StreamEnded,
    /// Reading failed.
    ReadFailed(PeerReadError),
    /// The hub closed the connection (write failure or shutdown).
    Retired,
}

impl PeerExit {
    /// Short label used as the retirement reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ClosedByPeer => "closed_by_peer",
            Self::StreamEnded => "stream_ended",
            Self::ReadFailed(_) => "read_failed",
            Self::Retired => "retired",
        }
    }
}

/// Drives the read side of one connection until it ends, then retires it.
pub struct PeerDriver<S> {
    hub: Arc<Hub>,
    connection: Arc<Connection>,
    identity: String,
    frames: S,
    state: PeerState,
    received: u64,
}

impl<S> PeerDriver<S>
where
    S: Stream<Item = Result<InboundFrame, PeerReadError>> + Unpin,
{
    /// Create a driver for a registered connection.
    pub fn new(hub: Arc<Hub>, connection: Arc<Connection>, identity: String, frames: S) -> Self {
        Self {
            hub,
            connection,
            identity,
            frames,
            state: PeerState::Active,
            received: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Text and binary frames received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Read until close, error, end of stream or retirement by the hub.
    pub async fn run(&mut self) -> PeerExit {
        let exit = loop {
            tokio::select! {
                () = self.connection.closed() => break PeerExit::Retired,
                frame = self.frames.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(exit) = self.on_frame(frame) {
                            break exit;
                        }
                    }
                    Some(Err(error)) => break PeerExit::ReadFailed(error),
                    None => break PeerExit::StreamEnded,
                },
            }
        };

        self.state = PeerState::Closing;
        let _ = self.hub.retire(self.connection.id(), exit.reason()).await;
        self.state = PeerState::Terminated;
        exit
    }

    fn on_frame(&mut self, frame: InboundFrame) -> Option<PeerExit> {
        match frame {
            InboundFrame::Text(text) => {
                self.received += 1;
                info!(identity = %self.identity, payload = %text, "received message");
            }
            InboundFrame::Binary(data) => {
                self.received += 1;
                info!(
                    identity = %self.identity,
                    len = data.len(),
                    payload = %String::from_utf8_lossy(&data),
                    "received message"
                );
            }
            InboundFrame::Ping | InboundFrame::Pong => {}
            InboundFrame::Close(reason) => {
                debug!(identity = %self.identity, ?reason, "client sent close frame");
                return Some(PeerExit::ClosedByPeer);
            }
        }
        None
    }
}
