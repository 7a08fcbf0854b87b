//! WebSocket session lifecycle: one upgraded socket from registration
//! through disconnect.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tracing::{info, instrument, warn};

use super::peer::{InboundFrame, PeerDriver};
use crate::errors::{PeerReadError, PeerWriteError};
use crate::hub::{Connection, ConnectionId, FrameSink, Hub};
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: &str) -> Result<(), PeerWriteError> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| PeerWriteError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        SinkExt::close(self)
            .await
            .map_err(|e| PeerWriteError::Transport(e.to_string()))
    }
}

/// Run a WebSocket session for an admitted client.
///
/// 1. Wraps the write half as a [`Connection`] and registers it
/// 2. Drives the read half until close, error or retirement
/// 3. The driver retires the connection on the way out
#[instrument(skip_all, fields(conn_id = %id, identity = %identity))]
pub async fn run_ws_session(
    socket: WebSocket,
    id: ConnectionId,
    identity: String,
    peer_addr: Option<SocketAddr>,
    hub: Arc<Hub>,
) {
    let (sink, stream) = socket.split();
    let connection = Arc::new(Connection::new(id, peer_addr, sink));

    if let Err(error) = hub.register(connection.clone(), identity.clone()) {
        warn!(%error, "registration refused, closing");
        let _ = connection.close().await;
        return;
    }
    info!(?peer_addr, "client connected");

    let frames = stream.map(|frame| {
        frame
            .map(InboundFrame::from)
            .map_err(|e| PeerReadError::Transport(e.to_string()))
    });
    let mut driver = PeerDriver::new(hub, connection.clone(), identity, frames);
    let exit = driver.run().await;

    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    info!(reason = exit.reason(), received = driver.received(), "client disconnected");
}
