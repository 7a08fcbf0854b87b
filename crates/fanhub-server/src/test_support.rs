//! In-memory frame sinks for unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::PeerWriteError;
use crate::hub::{Connection, ConnectionId, FrameSink};

#[derive(Default)]
struct Recorded {
    texts: Vec<String>,
    closes: usize,
}

/// Read side of a [`RecordingSink`].
#[derive(Clone, Default)]
pub(crate) struct Frames(Arc<Mutex<Recorded>>);

impl Frames {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.0.lock().texts.clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.0.lock().closes
    }
}

/// Records every frame it is given.
pub(crate) struct RecordingSink(Frames);

impl RecordingSink {
    pub(crate) fn new() -> (Self, Frames) {
        let frames = Frames::default();
        (Self(frames.clone()), frames)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_text(&mut self, text: &str) -> Result<(), PeerWriteError> {
        self.0.0.lock().texts.push(text.to_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        self.0.0.lock().closes += 1;
        Ok(())
    }
}

/// Every write fails with a transport error.
pub(crate) struct FailingSink;

#[async_trait]
impl FrameSink for FailingSink {
    async fn send_text(&mut self, _text: &str) -> Result<(), PeerWriteError> {
        Err(PeerWriteError::Transport("broken pipe".into()))
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        Err(PeerWriteError::Transport("broken pipe".into()))
    }
}

/// Every write and close never completes.
pub(crate) struct HangingSink;

#[async_trait]
impl FrameSink for HangingSink {
    async fn send_text(&mut self, _text: &str) -> Result<(), PeerWriteError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        std::future::pending().await
    }
}

/// Records frames after a fixed delay per write.
pub(crate) struct SlowSink {
    delay: Duration,
    frames: Frames,
}

impl SlowSink {
    pub(crate) fn new(delay: Duration) -> (Self, Frames) {
        let frames = Frames::default();
        (
            Self {
                delay,
                frames: frames.clone(),
            },
            frames,
        )
    }
}

#[async_trait]
impl FrameSink for SlowSink {
    async fn send_text(&mut self, text: &str) -> Result<(), PeerWriteError> {
        tokio::time::sleep(self.delay).await;
        self.frames.0.lock().texts.push(text.to_owned());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        self.frames.0.lock().closes += 1;
        Ok(())
    }
}

/// Every write panics.
pub(crate) struct PanickingSink;

#[async_trait]
impl FrameSink for PanickingSink {
    async fn send_text(&mut self, _text: &str) -> Result<(), PeerWriteError> {
        panic!("sink exploded")
    }

    async fn close(&mut self) -> Result<(), PeerWriteError> {
        Ok(())
    }
}

/// Shorthand for a recording connection.
pub(crate) fn recording(id: u64) -> (Arc<Connection>, Frames) {
    let (sink, frames) = RecordingSink::new();
    (
        Arc::new(Connection::new(ConnectionId::new(id), None, sink)),
        frames,
    )
}

/// Shorthand for a connection over an arbitrary sink.
pub(crate) fn connection(id: u64, sink: impl FrameSink + 'static) -> Arc<Connection> {
    Arc::new(Connection::new(ConnectionId::new(id), None, sink))
}
