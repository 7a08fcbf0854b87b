//! Demo clients: local WebSocket peers that exercise the hub.
//!
//! Each client connects to `ws://127.0.0.1:<port>/ws` with the `API-KEY`
//! header, logs every frame it receives and sends `"Hello server"` on a
//! fixed period. A failing client logs and ends without affecting the
//! process.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Text each demo client sends.
pub const DEMO_GREETING: &str = "Hello server";

const SEND_PERIOD: Duration = Duration::from_secs(1);

/// Why a demo client stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum DemoExit {
    /// Shutdown was requested.
    Cancelled,
    /// The server closed the connection.
    Closed,
    /// The handshake was refused or the server was unreachable.
    ConnectFailed(String),
    /// A read or write failed after connecting.
    Failed(String),
}

/// Spawn `count` demo clients against the local server on `port`.
pub fn spawn_demo_clients(
    count: usize,
    port: u16,
    api_key: &str,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let url = format!("ws://127.0.0.1:{port}/ws");
    (0..count)
        .map(|index| {
            let url = url.clone();
            let api_key = api_key.to_owned();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let exit = run_demo_client(index, &url, &api_key, SEND_PERIOD, cancel).await;
                match &exit {
                    DemoExit::Cancelled | DemoExit::Closed => {
                        info!(client = index, ?exit, "demo client stopped");
                    }
                    DemoExit::ConnectFailed(_) | DemoExit::Failed(_) => {
                        warn!(client = index, ?exit, "demo client stopped");
                    }
                }
            })
        })
        .collect()
}

/// Run one demo client until the connection ends or `cancel` fires.
pub async fn run_demo_client(
    index: usize,
    url: &str,
    api_key: &str,
    period: Duration,
    cancel: CancellationToken,
) -> DemoExit {
    let mut request = match url.into_client_request() {
        Ok(request) => request,
        Err(e) => return DemoExit::ConnectFailed(e.to_string()),
    };
    let key = match HeaderValue::from_str(api_key) {
        Ok(key) => key,
        Err(e) => return DemoExit::ConnectFailed(e.to_string()),
    };
    let _ = request.headers_mut().insert("api-key", key);

    let ws = tokio::select! {
        () = cancel.cancelled() => return DemoExit::Cancelled,
        result = connect_async(request) => match result {
            Ok((ws, _)) => ws,
            Err(e) => return DemoExit::ConnectFailed(e.to_string()),
        },
    };
    info!(client = index, url, "demo client connected");

    let (mut write, mut read) = ws.split();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.close().await;
                return DemoExit::Cancelled;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    info!(client = index, payload = text.as_str(), "demo client received");
                }
                Some(Ok(Message::Close(_))) | None => return DemoExit::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => return DemoExit::Failed(e.to_string()),
            },
            _ = ticker.tick() => {
                if let Err(e) = write.send(Message::text(DEMO_GREETING)).await {
                    return DemoExit::Failed(e.to_string());
                }
            }
        }
    }
}
