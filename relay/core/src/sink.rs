//! Chunk Sinks
//!
//! Where a session delivers its chunks. Any `FnMut(StreamChunk) + Send`
//! closure is a sink; [`ChannelSink`] forwards into a bounded tokio channel.
//!
//! A session invokes its sink sequentially from a single task, never
//! concurrently. A sink that returns `false` from [`ChunkSink::deliver`]
//! ends the session: the consumer is gone, so the stream is released
//! without further reads.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::messages::StreamChunk;

/// Consumer of session chunks
#[async_trait]
pub trait ChunkSink: Send {
    /// Deliver one chunk; `false` means no more chunks can be accepted
    async fn deliver(&mut self, chunk: StreamChunk) -> bool;
}

#[async_trait]
impl<F> ChunkSink for F
where
    F: FnMut(StreamChunk) + Send,
{
    async fn deliver(&mut self, chunk: StreamChunk) -> bool {
        (*self)(chunk);
        true
    }
}

/// Sink forwarding chunks into a bounded channel
///
/// A full channel suspends the session, which throttles network reads to
/// the consumer's pace. A dropped receiver ends the session.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamChunk>,
}

impl ChannelSink {
    /// Wrap a channel sender
    #[must_use]
    pub fn new(tx: mpsc::Sender<StreamChunk>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn deliver(&mut self, chunk: StreamChunk) -> bool {
        self.tx.send(chunk).await.is_ok()
    }
}
