//! Periodic demonstration broadcast.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hub::{Hub, Payload};

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The heartbeat was cancelled externally.
    Cancelled,
    /// The hub stopped accepting broadcasts.
    HubClosed,
}

/// Broadcast `payload` every `interval` until cancelled.
///
/// The first tick fires one full interval after start. Late ticks are
/// delayed rather than bunched.
pub async fn run_heartbeat(
    hub: Arc<Hub>,
    interval: Duration,
    payload: Payload,
    cancel: CancellationToken,
) -> HeartbeatExit {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return HeartbeatExit::Cancelled,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return HeartbeatExit::Cancelled,
                    result = hub.broadcast(payload.clone()) => {
                        if let Err(error) = result {
                            debug!(%error, "heartbeat stopping");
                            return HeartbeatExit::HubClosed;
                        }
                    }
                }
            }
        }
    }
}
