//! Broadcast hub: owns the registry and intake queue and runs the dispatcher.
//!
//! Producers call [`Hub::broadcast`], which only enqueues. A single
//! dispatcher task pops messages in FIFO order and writes each one to every
//! connection in a registry snapshot. Writes of one pass run concurrently,
//! each bounded by the write timeout and isolated from panics, so a slow or
//! dead peer only ever costs its own connection.

pub mod connection;
pub mod intake;
pub mod registry;

pub use connection::{Connection, ConnectionId, FrameSink, Payload, display_identity};
pub use intake::{IntakeQueue, PushOutcome};
pub use registry::{Registry, RegistryEntry};

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fanhub_settings::{HubSettings, OverflowPolicy};
use futures::FutureExt;
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{HubError, PeerWriteError};
use crate::metrics::{
    HUB_BROADCASTS_TOTAL, HUB_DELIVERIES_TOTAL, HUB_DISPATCH_DURATION_SECONDS,
    HUB_INTAKE_DROPPED_TOTAL, HUB_WRITE_FAILURES_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Upper bound on one write to one connection.
    pub write_timeout: Duration,
    /// Intake queue bound (`None` = unbounded).
    pub intake_capacity: Option<usize>,
    /// What a full bounded queue does with new messages.
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            intake_capacity: None,
            overflow_policy: OverflowPolicy::Block,
        }
    }
}

impl HubConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &HubSettings) -> Self {
        Self {
            write_timeout: Duration::from_millis(settings.write_timeout_ms),
            intake_capacity: settings.intake_capacity,
            overflow_policy: settings.overflow_policy,
        }
    }
}

/// Cumulative hub counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Messages accepted into the intake queue.
    pub broadcasts: u64,
    /// Successful per-connection writes.
    pub deliveries: u64,
    /// Writes that failed, timed out or panicked.
    pub write_failures: u64,
    /// Messages discarded by the overflow policy.
    pub dropped: u64,
    /// Currently registered connections.
    pub connections: usize,
    /// Messages waiting in the intake queue.
    pub queued: usize,
}

#[derive(Default)]
struct Counters {
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    write_failures: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, n: u64) {
        let _ = counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// The fan-out engine.
pub struct Hub {
    config: HubConfig,
    registry: Registry,
    intake: IntakeQueue,
    next_id: AtomicU64,
    dispatcher_started: AtomicBool,
    closing: AtomicBool,
    counters: Counters,
}

impl Hub {
    /// Create a hub. Call [`Hub::spawn_dispatcher`] to start delivery.
    pub fn new(config: HubConfig) -> Arc<Self> {
        let intake = IntakeQueue::new(config.intake_capacity, config.overflow_policy);
        Arc::new(Self {
            config,
            registry: Registry::new(),
            intake,
            next_id: AtomicU64::new(0),
            dispatcher_started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    /// Hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Allocate a fresh connection id.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Make a connection eligible for broadcasts.
    ///
    /// Fails once [`Hub::close_all`] has started; the caller still owns the
    /// connection and should close it.
    pub fn register(&self, connection: Arc<Connection>, identity: String) -> Result<(), HubError> {
        if self.is_closing() {
            return Err(HubError::ShuttingDown);
        }
        let id = connection.id();
        self.registry.register(connection, identity.clone())?;
        // close_all may have snapshotted the registry before the insert
        if self.is_closing() {
            let _ = self.registry.deregister(id);
            return Err(HubError::ShuttingDown);
        }
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %id, identity, "client registered");
        Ok(())
    }

    /// Remove a connection without closing it. Idempotent.
    pub fn deregister(&self, id: ConnectionId) -> Option<RegistryEntry> {
        let entry = self.registry.deregister(id)?;
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        Some(entry)
    }

    /// Deregister and close a connection.
    ///
    /// Safe to call from the dispatcher and the peer driver concurrently:
    /// only the first call closes the transport. Returns whether this call
    /// removed the entry.
    pub async fn retire(&self, id: ConnectionId, reason: &str) -> bool {
        let Some(entry) = self.deregister(id) else {
            return false;
        };
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.to_owned()).increment(1);
        info!(
            conn_id = %id,
            identity = %entry.identity,
            peer_addr = ?entry.connection.peer_addr(),
            age_ms = millis(entry.connection.age()),
            registered_ms = millis(entry.registered_at.elapsed()),
            reason,
            "client retired"
        );
        let _ = entry.connection.close().await;
        true
    }

    /// Enqueue a message for delivery to every registered connection.
    ///
    /// Never waits on an unbounded queue. Messages discarded by the overflow
    /// policy still return `Ok` and are counted in [`HubStats::dropped`].
    pub async fn broadcast(&self, message: impl Into<Payload>) -> Result<(), HubError> {
        match self.intake.push(message.into()).await? {
            PushOutcome::Queued => {
                Counters::bump(&self.counters.broadcasts, 1);
                counter!(HUB_BROADCASTS_TOTAL).increment(1);
            }
            PushOutcome::DroppedNewest => {
                Counters::bump(&self.counters.dropped, 1);
                counter!(HUB_INTAKE_DROPPED_TOTAL).increment(1);
                warn!(policy = "dropNewest", "intake full, message discarded");
            }
            PushOutcome::DroppedOldest => {
                Counters::bump(&self.counters.broadcasts, 1);
                Counters::bump(&self.counters.dropped, 1);
                counter!(HUB_BROADCASTS_TOTAL).increment(1);
                counter!(HUB_INTAKE_DROPPED_TOTAL).increment(1);
                warn!(policy = "dropOldest", "intake full, oldest message discarded");
            }
        }
        Ok(())
    }

    /// Stop accepting broadcasts. Queued messages are still delivered.
    pub fn close_intake(&self) {
        self.intake.close();
    }

    /// Whether broadcasts are still accepted.
    pub fn is_accepting(&self) -> bool {
        !self.intake.is_closed()
    }

    /// Start the dispatcher task. Only one may ever run per hub.
    ///
    /// On cancellation the intake is closed and every queued message is
    /// delivered before the task ends.
    pub fn spawn_dispatcher(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, HubError> {
        if self.dispatcher_started.swap(true, Ordering::AcqRel) {
            return Err(HubError::DispatcherAlreadyRunning);
        }
        let hub = Arc::clone(self);
        Ok(tokio::spawn(async move { hub.run_dispatcher(cancel).await }))
    }

    async fn run_dispatcher(&self, cancel: CancellationToken) {
        debug!("dispatcher started");
        loop {
            // cancel first: a busy producer must not hide shutdown
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = self.intake.pop() => match next {
                    Some(payload) => self.dispatch(&payload).await,
                    None => break,
                },
            }
        }

        self.intake.close();
        let mut drained = 0_usize;
        while let Some(payload) = self.intake.pop().await {
            self.dispatch(&payload).await;
            drained += 1;
        }
        info!(drained, "dispatcher stopped");
    }

    /// Deliver one message to every connection of a registry snapshot.
    async fn dispatch(&self, payload: &Payload) {
        let targets = self.registry.snapshot();
        if targets.is_empty() {
            debug!("no recipients, message discarded");
            return;
        }
        let started = Instant::now();

        let outcomes = join_all(targets.iter().map(|conn| self.write_one(conn, payload))).await;

        let mut delivered = 0_u64;
        let mut failures = 0_u64;
        let mut failed = Vec::new();
        let mut stale = Vec::new();
        for (conn, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => delivered += 1,
                // retired by its peer driver during this pass
                Err(PeerWriteError::Closed) => {
                    debug!(conn_id = %conn.id(), "skipped closed connection");
                    stale.push(conn.id());
                }
                Err(error) => {
                    let kind = match &error {
                        PeerWriteError::Closed => "closed",
                        PeerWriteError::Timeout(_) => "timeout",
                        PeerWriteError::Transport(_) => "transport",
                        PeerWriteError::Panicked => "panicked",
                    };
                    counter!(HUB_WRITE_FAILURES_TOTAL, "kind" => kind).increment(1);
                    warn!(conn_id = %conn.id(), %error, "write failed, retiring connection");
                    failures += 1;
                    failed.push(conn.id());
                }
            }
        }

        Counters::bump(&self.counters.deliveries, delivered);
        Counters::bump(&self.counters.write_failures, failures);
        counter!(HUB_DELIVERIES_TOTAL).increment(delivered);
        histogram!(HUB_DISPATCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(
            recipients = targets.len(),
            delivered,
            failures,
            "message dispatched"
        );

        let retirements = failed
            .into_iter()
            .map(|id| (id, "write_failed"))
            .chain(stale.into_iter().map(|id| (id, "closed")));
        let _ = join_all(retirements.map(|(id, reason)| self.retire(id, reason))).await;
    }

    async fn write_one(&self, conn: &Connection, payload: &str) -> Result<(), PeerWriteError> {
        let write = AssertUnwindSafe(conn.send(payload)).catch_unwind();
        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(PeerWriteError::Panicked),
            Err(_elapsed) => Err(PeerWriteError::Timeout(self.config.write_timeout)),
        }
    }

    /// Close and deregister every connection; later registrations are refused.
    pub async fn close_all(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let ids: Vec<ConnectionId> = self.registry.entries().into_iter().map(|(id, _)| id).collect();
        let closed = join_all(ids.into_iter().map(|id| self.retire(id, "shutdown")))
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();
        info!(closed, "all connections closed");
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registry.contains(id)
    }

    /// Display identities of registered connections, ordered by id.
    pub fn identities(&self) -> Vec<String> {
        self.registry
            .entries()
            .into_iter()
            .map(|(_, identity)| identity)
            .collect()
    }

    /// Current counters.
    pub fn stats(&self) -> HubStats {
        HubStats {
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            connections: self.registry.len(),
            queued: self.intake.len(),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
