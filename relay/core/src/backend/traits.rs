//! Chat Backend Trait and Types
//!
//! Defines the contract callers use to talk to a chat backend, along with
//! the handle returned for every in-flight request.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ConfigError;
use crate::messages::{ChatMessage, StreamChunk};
use crate::session::{SessionOutcome, SessionState};
use crate::sink::ChunkSink;
use crate::transport::TransportError;

/// Errors surfaced by the façade
///
/// `send` never fails; these come from construction and from
/// [`ChatBackend::send_message`], which folds the chunk stream into a value.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The session ended with an `Error` chunk
    #[error("Chat stream failed: {0}")]
    Stream(String),

    /// The session was cancelled before a terminal chunk
    #[error("Chat request was cancelled")]
    Cancelled,

    /// The session task ended without a terminal chunk
    #[error("Chat session ended unexpectedly")]
    Interrupted,

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport could not be built
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Per-call options for `send`
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Caller-controlled cancellation
    ///
    /// The session runs on a child of this token: cancelling it stops the
    /// session, while [`StreamHandle::abort`] never cancels it.
    pub cancellation_token: Option<CancellationToken>,
}

impl SendOptions {
    /// Options with no caller token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a caller token
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Token the session observes
    pub(crate) fn session_token(&self) -> CancellationToken {
        self.cancellation_token
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token)
    }
}

/// Handle to one in-flight session
///
/// Dropping the handle detaches the session; it keeps running until it
/// finishes or its token is cancelled.
#[derive(Debug)]
pub struct StreamHandle {
    id: Uuid,
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionOutcome>,
}

impl StreamHandle {
    pub(crate) fn new(
        id: Uuid,
        token: CancellationToken,
        state: watch::Receiver<SessionState>,
        task: JoinHandle<SessionOutcome>,
    ) -> Self {
        Self {
            id,
            token,
            state,
            task,
        }
    }

    /// Stop the session
    ///
    /// Safe to call any number of times, including after completion. No
    /// chunk is delivered once the session observes the cancellation.
    pub fn abort(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(session_id = %self.id, "Aborting session");
            self.token.cancel();
        }
    }

    /// Session correlation ID
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Latest session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Token the session observes
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Wait for the session to end
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Interrupted` if the session task panicked, for
    /// example inside a sink.
    pub async fn join(self) -> Result<SessionOutcome, ChatError> {
        self.task.await.map_err(|e| {
            tracing::error!(session_id = %self.id, error = %e, "Session task failed");
            ChatError::Interrupted
        })
    }
}

/// Chat backend contract
///
/// Implementations must keep sessions independent: concurrent calls share
/// no mutable state.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Check if the backend answers at all
    async fn health_check(&self) -> bool;

    /// Start a session delivering into a boxed sink
    ///
    /// Returns immediately; chunks arrive on the sink as they are parsed.
    fn send_to_sink(
        &self,
        messages: Vec<ChatMessage>,
        sink: Box<dyn ChunkSink>,
        options: SendOptions,
    ) -> StreamHandle;

    /// Start a session delivering into a bounded channel
    ///
    /// Dropping the receiver ends the session.
    fn send_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: SendOptions,
    ) -> (mpsc::Receiver<StreamChunk>, StreamHandle);

    /// Chunks as a `Stream`
    ///
    /// Dropping the stream ends the session.
    fn stream(&self, messages: Vec<ChatMessage>) -> ReceiverStream<StreamChunk> {
        let (rx, _handle) = self.send_streaming(messages, SendOptions::default());
        ReceiverStream::new(rx)
    }

    /// Send and wait for the complete reply
    async fn send_message(&self, messages: Vec<ChatMessage>) -> Result<String, ChatError> {
        let (rx, handle) = self.send_streaming(messages, SendOptions::default());
        collect_reply(rx, handle).await
    }
}

/// Fold a chunk channel into the reply text
///
/// # Errors
///
/// `ChatError::Stream` for an `Error` chunk, `ChatError::Cancelled` if the
/// session was cancelled first, `ChatError::Interrupted` if the channel
/// closed without a terminal chunk for any other reason.
pub async fn collect_reply(
    mut rx: mpsc::Receiver<StreamChunk>,
    handle: StreamHandle,
) -> Result<String, ChatError> {
    let mut reply = String::new();

    while let Some(chunk) = rx.recv().await {
        match chunk {
            StreamChunk::Text { data } => reply.push_str(&data),
            StreamChunk::Done => return Ok(reply),
            StreamChunk::Error { message } => return Err(ChatError::Stream(message)),
        }
    }

    match handle.join().await? {
        SessionOutcome::Cancelled => Err(ChatError::Cancelled),
        outcome => {
            tracing::warn!(?outcome, "Channel closed without terminal chunk");
            Err(ChatError::Interrupted)
        }
    }
}
