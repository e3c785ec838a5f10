//! Relay Core - Streaming Chat Transport Client
//!
//! This crate issues chat requests to an HTTP backend and delivers the
//! streamed reply to a caller-supplied sink, one chunk at a time. It has no
//! opinion about how the reply is rendered.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Caller                                                          │
//! │    ChatClient::send(messages, sink, options) ──► StreamHandle    │
//! └───────────────┬──────────────────────────────────────▲───────────┘
//!                 │ spawn                                │ abort()
//! ┌───────────────▼──────────────────────────────────────┴───────────┐
//! │  TransportSession (one tokio task per send)                      │
//! │                                                                  │
//! │   HttpTransport ──► StreamDecoder ──► FrameBuffer ──► Parser     │
//! │     (bytes)            (text)          (lines)        (frames)   │
//! │                                                          │       │
//! │   FallbackStream (backend unreachable) ──────────────────┤       │
//! │                                                          ▼       │
//! │                                                      ChunkSink   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatClient`]: the façade; cheap to clone, stateless per call
//! - [`StreamHandle`]: returned by every `send`; `abort()` stops the session
//! - [`StreamChunk`]: `Text`, then exactly one `Done` or `Error`
//! - [`ChunkSink`]: where chunks go (closures and channels both work)
//! - [`ClientConfig`]: file, environment and CLI configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use relay_core::{ChatBackend, ChatClient, ChatMessage, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relay_core::ChatError> {
//!     let client = ChatClient::from_config(ClientConfig::default())?;
//!     let reply = client
//!         .send_message(vec![ChatMessage::user("Why is the sky blue?")])
//!         .await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: the `ChatBackend` trait and the HTTP `ChatClient`
//! - [`config`]: TOML configuration with environment overrides
//! - [`fallback`]: the advisory stream replayed when the backend is down
//! - [`messages`]: `ChatMessage` and `StreamChunk`
//! - [`session`]: one request from POST to terminal chunk
//! - [`sink`]: chunk consumers
//! - [`transport`]: network primitive and the decode/frame/parse pipeline

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod fallback;
pub mod messages;
pub mod session;
pub mod sink;
pub mod transport;

// Re-exports for convenience
pub use backend::{
    collect_reply, BackendConfig, ChatBackend, ChatClient, ChatError, SendOptions, StreamHandle,
};
pub use messages::{ChatMessage, Role, StreamChunk};
pub use session::{SessionOutcome, SessionState, StreamConfig, TransportSession};
pub use sink::{ChannelSink, ChunkSink};

// Fallback exports
pub use fallback::{FallbackConfig, FallbackPolicy, DEFAULT_FALLBACK_MESSAGE};

// Transport exports
pub use transport::{
    EventFrameParser, FrameBuffer, HttpTransport, ParsedFrame, ParserMode, ReqwestTransport,
    StreamDecoder, TransportError,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ClientConfig,
    ClientToml, ConfigError, ConfigOverrides, ConfigSource,
};

// Cancellation primitive used by `SendOptions`
pub use tokio_util::sync::CancellationToken;
