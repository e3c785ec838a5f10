//! Fallback Stream
//!
//! When the backend cannot be reached, a session can either report the
//! failure or replay a fixed advisory message as if it were streaming. The
//! replay keeps the caller's experience uniform in disconnected and
//! development setups.
//!
//! The cost is that a real outage looks the same as "no backend
//! configured" to the caller. [`FallbackPolicy::Error`] turns the replay
//! off for deployments where that matters.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::messages::StreamChunk;
use crate::session::{Emitter, SessionOutcome};
use crate::sink::ChunkSink;

/// Advisory text replayed when the backend is unreachable
pub const DEFAULT_FALLBACK_MESSAGE: &str = "The chat backend is not reachable right now. \
     Check the endpoint in your relay configuration, then try again.";

/// What a session does when the request fails before streaming
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Replay the advisory message, then `Done`
    #[default]
    Simulate,
    /// Emit a single `Error` chunk
    Error,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulate" => Ok(Self::Simulate),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown fallback policy '{other}'")),
        }
    }
}

impl std::fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simulate => write!(f, "simulate"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Configuration for the fallback path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Replay or report
    pub policy: FallbackPolicy,
    /// Pause between replayed chunks in milliseconds
    pub interval_ms: u64,
    /// Characters per replayed chunk
    pub chunk_chars: usize,
    /// Text to replay
    pub message: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            policy: FallbackPolicy::Simulate,
            interval_ms: 20,
            chunk_chars: 1,
            message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl FallbackConfig {
    /// Pause between replayed chunks
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Split `message` into pieces of at most `chunk_chars` characters
///
/// Splits on `char` boundaries, never inside a UTF-8 sequence.
#[must_use]
pub fn split_message(message: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = message.chars().collect();
    chars
        .chunks(chunk_chars.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Replay the advisory message through `emitter`, then emit `Done`
///
/// Cancellation is checked during every pause and before every chunk.
pub(crate) async fn replay<S: ChunkSink>(
    config: &FallbackConfig,
    emitter: &mut Emitter<S>,
) -> Result<(), SessionOutcome> {
    let interval = config.interval();
    let token = emitter.token().clone();
    let pieces = split_message(&config.message, config.chunk_chars);

    tracing::debug!(
        chunks = pieces.len(),
        interval_ms = config.interval_ms,
        "Replaying fallback message"
    );

    for (index, piece) in pieces.into_iter().enumerate() {
        // Pace replayed chunks to mimic incremental arrival
        if index > 0 && !interval.is_zero() {
            tokio::select! {
                biased;
                () = token.cancelled() => return Err(SessionOutcome::Cancelled),
                () = tokio::time::sleep(interval) => {}
            }
        }
        emitter.emit(StreamChunk::text(piece)).await?;
    }

    emitter.emit(StreamChunk::Done).await
}
