//! Transport Session
//!
//! One session owns one logical request: it issues the POST, drives the
//! read loop, runs every chunk through decoder → frame buffer → parser, and
//! hands the resulting chunks to the sink.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──► Requesting ──► Streaming ──► Done
//!                │               │
//!                │               └──────► Errored   (mid-stream failure)
//!                ▼
//!             Errored ──► Streaming (fallback replay) ──► Done
//!
//!   any state ──► Cancelled
//! ```
//!
//! # Guarantees
//!
//! - Text chunks leave in the order their bytes arrived.
//! - At most one terminal chunk (`Done` or `Error`) per session.
//! - Once cancellation is observed, the sink is never invoked again and the
//!   request future or body stream is dropped, releasing the connection.
//!
//! Cancellation is cooperative. The token is checked at the top of every
//! read, raced against every await, and checked before every delivery, so a
//! decode step that already started finishes but nothing after it runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::fallback::{self, FallbackPolicy};
use crate::messages::{ChatMessage, StreamChunk};
use crate::sink::ChunkSink;
use crate::transport::{
    ByteStream, EventFrameParser, FrameBuffer, HttpTransport, ParsedFrame, ParserMode,
    StreamDecoder, TransportError, TransportRequest, DEFAULT_MAX_LINE_BYTES,
};

/// Bytes of a failed response body kept for the error message
const MAX_ERROR_BODY_BYTES: usize = 4096;

/// How long a failed response body may take to arrive
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Configuration
// ============================================================================

/// Stream handling configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Treatment of lines without the `data:` prefix
    pub parser_mode: ParserMode,
    /// Longest accepted line (and JSON body) in bytes
    pub max_line_bytes: usize,
    /// Capacity of channels created by `send_streaming`
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            parser_mode: ParserMode::Tolerant,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            channel_capacity: 100,
        }
    }
}

// ============================================================================
// State and Outcome
// ============================================================================

/// Lifecycle state of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, request not yet issued
    Idle,
    /// Waiting for response headers
    Requesting,
    /// Reading the body (or replaying the fallback message)
    Streaming,
    /// Finished with a `Done` chunk
    Done,
    /// Failed; entered on mid-stream errors and on transport failure
    Errored,
    /// Stopped by cancellation or a departed consumer
    Cancelled,
}

impl SessionState {
    /// Whether no further transitions are possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored | Self::Cancelled)
    }
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Backend stream completed and `Done` was delivered
    Completed,
    /// Backend unreachable; fallback message and `Done` were delivered
    Degraded,
    /// An `Error` chunk carrying this message was delivered
    Failed(String),
    /// Cancelled; nothing was delivered after cancellation was observed
    Cancelled,
    /// The sink stopped accepting chunks
    SinkClosed,
}

/// Result of one session step: `Ok` continues, `Err` ends the session with
/// the carried outcome
pub(crate) type Step = Result<(), SessionOutcome>;

// ============================================================================
// Emitter
// ============================================================================

/// Delivery guard between a session and its sink
///
/// Enforces the cancellation and single-terminal rules in one place.
pub(crate) struct Emitter<S> {
    sink: S,
    token: CancellationToken,
    completed: bool,
    delivered: usize,
}

impl<S: ChunkSink> Emitter<S> {
    pub(crate) fn new(sink: S, token: CancellationToken) -> Self {
        Self {
            sink,
            token,
            completed: false,
            delivered: 0,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) async fn emit(&mut self, chunk: StreamChunk) -> Step {
        if self.token.is_cancelled() {
            return Err(SessionOutcome::Cancelled);
        }
        if self.completed {
            tracing::trace!(?chunk, "Dropping chunk after terminal chunk");
            return Ok(());
        }

        let terminal = chunk.is_terminal();
        let accepted = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(SessionOutcome::Cancelled),
            accepted = self.sink.deliver(chunk) => accepted,
        };
        if !accepted {
            return Err(SessionOutcome::SinkClosed);
        }

        self.delivered += 1;
        if terminal {
            self.completed = true;
        }
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Reply shape of non-streaming backends
#[derive(Deserialize)]
struct JsonReply {
    content: String,
}

/// One request/response exchange with a chat backend
pub struct TransportSession<T: ?Sized> {
    id: Uuid,
    transport: Arc<T>,
    config: Arc<ClientConfig>,
    messages: Vec<ChatMessage>,
    token: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl<T: HttpTransport + ?Sized> TransportSession<T> {
    /// Create an idle session
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        config: Arc<ClientConfig>,
        messages: Vec<ChatMessage>,
        token: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            id: Uuid::new_v4(),
            transport,
            config,
            messages,
            token,
            state,
        }
    }

    /// Correlation ID used in logs
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the session to completion, delivering chunks to `sink`
    pub async fn run<S: ChunkSink>(self, sink: S) -> SessionOutcome {
        let span = tracing::info_span!("chat_session", session_id = %self.id);
        self.drive(sink).instrument(span).await
    }

    async fn drive<S: ChunkSink>(self, sink: S) -> SessionOutcome {
        let started = Instant::now();
        tracing::info!(messages = self.messages.len(), "Session started");

        let mut emitter = Emitter::new(sink, self.token.clone());
        let outcome = match self.execute(&mut emitter).await {
            Ok(()) => SessionOutcome::Completed,
            Err(outcome) => outcome,
        };

        self.transition(match outcome {
            SessionOutcome::Completed | SessionOutcome::Degraded => SessionState::Done,
            SessionOutcome::Failed(_) => SessionState::Errored,
            SessionOutcome::Cancelled | SessionOutcome::SinkClosed => SessionState::Cancelled,
        });

        tracing::info!(
            ?outcome,
            chunks = emitter.delivered,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Session finished"
        );
        outcome
    }

    async fn execute<S: ChunkSink>(&self, emitter: &mut Emitter<S>) -> Step {
        if self.token.is_cancelled() {
            return Err(SessionOutcome::Cancelled);
        }

        self.transition(SessionState::Requesting);
        let request = self.build_request();
        tracing::debug!(url = %request.url, "Issuing chat request");

        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(SessionOutcome::Cancelled),
            result = self.transport.post_stream(request) => result,
        };

        let response = match result {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let status = response.status;
                // Only the Error policy reports the body
                let body = match self.config.fallback.policy {
                    FallbackPolicy::Error => read_error_body(&self.token, response.body).await?,
                    FallbackPolicy::Simulate => {
                        drop(response);
                        String::new()
                    }
                };
                return self
                    .transport_failed(TransportError::Status { status, body }, emitter)
                    .await;
            }
            Err(e) => return self.transport_failed(e, emitter).await,
        };

        self.transition(SessionState::Streaming);
        if response.is_event_stream() {
            self.read_lines(response.body, emitter).await
        } else if response.is_json() {
            self.read_json(response.body, emitter).await
        } else {
            self.read_untyped(response.body, emitter).await
        }
    }

    fn build_request(&self) -> TransportRequest {
        let mut body = serde_json::json!({
            "messages": self.messages,
            "stream": true,
        });
        if let Some(ref model) = self.config.backend.model {
            body["model"] = serde_json::json!(model);
        }

        TransportRequest {
            url: self.config.backend.chat_url(),
            body,
        }
    }

    /// Request produced no usable response
    async fn transport_failed<S: ChunkSink>(
        &self,
        error: TransportError,
        emitter: &mut Emitter<S>,
    ) -> Step {
        self.transition(SessionState::Errored);

        match self.config.fallback.policy {
            FallbackPolicy::Simulate => {
                tracing::warn!(error = %error, "Backend unavailable, replaying fallback message");
                self.transition(SessionState::Streaming);
                fallback::replay(&self.config.fallback, emitter).await?;
                Err(SessionOutcome::Degraded)
            }
            FallbackPolicy::Error => fail(error, emitter).await,
        }
    }

    /// Event-stream and bare-line bodies
    async fn read_lines<S: ChunkSink>(
        &self,
        mut body: ByteStream,
        emitter: &mut Emitter<S>,
    ) -> Step {
        let mut decoder = StreamDecoder::new();
        let mut frames = FrameBuffer::new(self.config.stream.max_line_bytes);
        let mut parser = EventFrameParser::new(self.config.stream.parser_mode);

        while let Some(chunk) = next_chunk(&self.token, &mut body).await? {
            match chunk {
                Ok(bytes) => {
                    tracing::trace!(bytes = bytes.len(), "Chunk received");
                    let text = decoder.decode(&bytes, false);
                    feed(&text, &mut frames, &mut parser, emitter).await?;
                }
                Err(e) => return fail(e, emitter).await,
            }
        }

        // End of data without a sentinel: drain everything still held
        let tail = decoder.finish();
        feed(&tail, &mut frames, &mut parser, emitter).await?;
        if let Some(line) = frames.flush() {
            feed_line(&line, &mut parser, emitter).await?;
        }

        tracing::debug!("Stream ended without sentinel");
        emitter.emit(StreamChunk::Done).await
    }

    /// Single-document JSON bodies: `{ "content": "..." }`
    async fn read_json<S: ChunkSink>(
        &self,
        mut body: ByteStream,
        emitter: &mut Emitter<S>,
    ) -> Step {
        let limit = self.config.stream.max_line_bytes;
        let mut buf = Vec::new();

        while let Some(chunk) = next_chunk(&self.token, &mut body).await? {
            match chunk {
                Ok(bytes) => {
                    buf.extend_from_slice(&bytes);
                    if buf.len() > limit {
                        let err = TransportError::FrameTooLarge {
                            len: buf.len(),
                            max: limit,
                        };
                        return fail(err, emitter).await;
                    }
                }
                Err(e) => return fail(e, emitter).await,
            }
        }

        match serde_json::from_slice::<JsonReply>(&buf) {
            Ok(reply) => emit_reply(reply, emitter).await,
            Err(e) => fail(TransportError::InvalidResponse(e.to_string()), emitter).await,
        }
    }

    /// Bodies with any other content type, or none
    ///
    /// A body starting with `{` is held until it ends and tried as a JSON
    /// reply. Anything else, including JSON without a string `content`,
    /// runs through the line pipeline with the held bytes first.
    async fn read_untyped<S: ChunkSink>(
        &self,
        mut body: ByteStream,
        emitter: &mut Emitter<S>,
    ) -> Step {
        let limit = self.config.stream.max_line_bytes;
        let mut buf = Vec::new();
        let mut error = None;
        let mut ended = false;

        while !ended && buf.len() <= limit && json_candidate(&buf) {
            match next_chunk(&self.token, &mut body).await? {
                Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    error = Some(e);
                    ended = true;
                }
                None => ended = true,
            }
        }

        if ended && error.is_none() && json_candidate(&buf) {
            if let Ok(reply) = serde_json::from_slice::<JsonReply>(&buf) {
                tracing::debug!("Untyped body parsed as a JSON reply");
                return emit_reply(reply, emitter).await;
            }
        }

        let head = futures::stream::iter(
            std::iter::once(Ok(Bytes::from(buf))).chain(error.map(Err)),
        );
        let rest: ByteStream = if ended {
            futures::stream::empty().boxed()
        } else {
            body
        };
        self.read_lines(head.chain(rest).boxed(), emitter).await
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Session state changed");
        }
    }
}

/// Await the next body chunk unless cancelled first
async fn next_chunk(
    token: &CancellationToken,
    body: &mut ByteStream,
) -> Result<Option<Result<Bytes, TransportError>>, SessionOutcome> {
    if token.is_cancelled() {
        return Err(SessionOutcome::Cancelled);
    }
    tokio::select! {
        biased;
        () = token.cancelled() => Err(SessionOutcome::Cancelled),
        next = body.next() => Ok(next),
    }
}

/// Keep the head of a failed response for the error message
///
/// Stops at [`MAX_ERROR_BODY_BYTES`] or [`ERROR_BODY_TIMEOUT`], whichever
/// comes first, and keeps what arrived.
async fn read_error_body(
    token: &CancellationToken,
    mut body: ByteStream,
) -> Result<String, SessionOutcome> {
    let mut buf = Vec::new();
    let read = async {
        while buf.len() < MAX_ERROR_BODY_BYTES {
            match next_chunk(token, &mut body).await? {
                Some(Ok(bytes)) => {
                    let take = bytes.len().min(MAX_ERROR_BODY_BYTES - buf.len());
                    buf.extend_from_slice(&bytes[..take]);
                }
                Some(Err(_)) | None => break,
            }
        }
        Ok::<(), SessionOutcome>(())
    };

    match tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await {
        Ok(result) => result?,
        Err(_) => tracing::debug!("Timed out reading error body"),
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

/// Whether `buf` is empty so far or opens a JSON object
fn json_candidate(buf: &[u8]) -> bool {
    matches!(
        buf.iter().find(|b| !b.is_ascii_whitespace()),
        None | Some(&b'{')
    )
}

/// Deliver a parsed JSON reply, then `Done`
async fn emit_reply<S: ChunkSink>(reply: JsonReply, emitter: &mut Emitter<S>) -> Step {
    if !reply.content.is_empty() {
        emitter.emit(StreamChunk::text(reply.content)).await?;
    }
    emitter.emit(StreamChunk::Done).await
}

/// Push decoded text through the frame buffer and parser
async fn feed<S: ChunkSink>(
    text: &str,
    frames: &mut FrameBuffer,
    parser: &mut EventFrameParser,
    emitter: &mut Emitter<S>,
) -> Step {
    if text.is_empty() {
        return Ok(());
    }

    let mut lines = Vec::new();
    let overflow = frames.push_into(text, &mut lines).err();
    for line in &lines {
        feed_line(line, parser, emitter).await?;
    }

    match overflow {
        Some(e) => fail(e, emitter).await,
        None => Ok(()),
    }
}

async fn feed_line<S: ChunkSink>(
    line: &str,
    parser: &mut EventFrameParser,
    emitter: &mut Emitter<S>,
) -> Step {
    match parser.parse(line) {
        None => Ok(()),
        Some(ParsedFrame::Data(data)) => emitter.emit(StreamChunk::Text { data }).await,
        Some(ParsedFrame::Done) => {
            tracing::debug!("Sentinel received");
            emitter.emit(StreamChunk::Done).await?;
            Err(SessionOutcome::Completed)
        }
    }
}

/// Emit the single `Error` chunk and end the session
async fn fail<S: ChunkSink>(error: TransportError, emitter: &mut Emitter<S>) -> Step {
    let message = error.to_string();
    tracing::warn!(error = %message, "Stream failed");
    emitter.emit(StreamChunk::error(message.clone())).await?;
    Err(SessionOutcome::Failed(message))
}
