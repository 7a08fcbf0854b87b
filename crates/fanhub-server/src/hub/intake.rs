//! FIFO intake queue between broadcast producers and the dispatcher.

use std::collections::VecDeque;

use fanhub_settings::OverflowPolicy;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::connection::Payload;
use crate::errors::HubError;

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The message was queued.
    Queued,
    /// The queue was full; the pushed message was discarded.
    DroppedNewest,
    /// The queue was full; the oldest queued message was discarded.
    DroppedOldest,
}

#[derive(Default)]
struct IntakeState {
    queue: VecDeque<Payload>,
    closed: bool,
}

/// Many-producer, single-consumer queue, optionally bounded.
pub struct IntakeQueue {
    state: Mutex<IntakeState>,
    items: Notify,
    space: Notify,
    capacity: Option<usize>,
    policy: OverflowPolicy,
}

impl IntakeQueue {
    /// Create a queue. `capacity: None` is unbounded.
    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(IntakeState::default()),
            items: Notify::new(),
            space: Notify::new(),
            capacity,
            policy,
        }
    }

    /// Enqueue a message, applying the overflow policy when full.
    ///
    /// Waits only under [`OverflowPolicy::Block`] on a full bounded queue.
    pub async fn push(&self, payload: Payload) -> Result<PushOutcome, HubError> {
        loop {
            // registered before the check so a concurrent pop cannot be missed
            let space = self.space.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return Err(HubError::ShuttingDown);
                }
                let full = self.capacity.is_some_and(|cap| state.queue.len() >= cap);
                if !full {
                    state.queue.push_back(payload);
                    drop(state);
                    self.items.notify_one();
                    return Ok(PushOutcome::Queued);
                }
                match self.policy {
                    OverflowPolicy::Block => {}
                    OverflowPolicy::DropNewest => return Ok(PushOutcome::DroppedNewest),
                    OverflowPolicy::DropOldest => {
                        let _ = state.queue.pop_front();
                        state.queue.push_back(payload);
                        drop(state);
                        self.items.notify_one();
                        return Ok(PushOutcome::DroppedOldest);
                    }
                }
            }
            space.await;
        }
    }

    /// Dequeue the oldest message. Returns `None` once closed and empty.
    pub async fn pop(&self) -> Option<Payload> {
        loop {
            let items = self.items.notified();
            {
                let mut state = self.state.lock();
                if let Some(payload) = state.queue.pop_front() {
                    drop(state);
                    self.space.notify_one();
                    return Some(payload);
                }
                if state.closed {
                    return None;
                }
            }
            items.await;
        }
    }

    /// Stop accepting messages. Already queued messages stay poppable.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.items.notify_waiters();
        self.items.notify_one();
        self.space.notify_waiters();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}
