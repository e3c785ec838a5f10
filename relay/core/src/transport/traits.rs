//! Transport Traits
//!
//! The network primitive the session depends on. A primitive issues one POST
//! and hands back the status, the content type and the body as a stream of
//! byte chunks.
//!
//! # Cancellation
//!
//! Cancellation is expressed by dropping. The session races the request
//! future and every body read against its cancellation token; when the token
//! fires, the future or the [`ByteStream`] is dropped, which for `reqwest`
//! closes the underlying connection instead of merely ceasing to read it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Body of a response as it arrives from the network
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Errors raised below the session
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Request never produced a response (refused, DNS, timeout)
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Leading part of the response body
        body: String,
    },

    /// Body stream failed after the response started
    #[error("Stream read failed: {0}")]
    Body(String),

    /// A single line grew past the configured limit
    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge {
        /// Bytes buffered for the line so far
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// An outbound chat request
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// Full URL of the chat endpoint
    pub url: String,
    /// JSON body
    pub body: serde_json::Value,
}

/// A response whose body has not been read yet
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Body chunks
    pub body: ByteStream,
}

impl TransportResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is a single JSON document
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.media_type()
            .is_some_and(|m| m == "application/json" || m.ends_with("+json"))
    }

    /// Whether the body is a server-sent event stream
    #[must_use]
    pub fn is_event_stream(&self) -> bool {
        self.media_type().is_some_and(|m| m == "text/event-stream")
    }

    /// Media type without parameters, lowercased
    fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Network primitive used by sessions
///
/// Implement this trait to run sessions over something other than
/// `reqwest`, or to drive them from memory in tests.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// POST `request` and return the response once headers arrive
    ///
    /// A non-success status is still `Ok`; the session decides what it
    /// means. `Err` is reserved for requests that produced no response.
    async fn post_stream(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError>;

    /// Check whether anything answers at `url`
    async fn probe(&self, url: &str) -> bool;
}
