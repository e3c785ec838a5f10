//! Chat Backend Façade
//!
//! The public entry point for callers. [`ChatClient`] turns a message list
//! into a running [`TransportSession`](crate::session::TransportSession) and
//! hands back a [`StreamHandle`].
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::backend::{ChatBackend, ChatClient, SendOptions};
//! use relay_core::config::load_config;
//! use relay_core::messages::{ChatMessage, StreamChunk};
//!
//! let client = ChatClient::from_config(load_config()?)?;
//! let handle = client.send(
//!     vec![ChatMessage::user("Hello!")],
//!     |chunk: StreamChunk| print!("{}", chunk.as_text().unwrap_or_default()),
//!     SendOptions::default(),
//! );
//! // later, from anywhere:
//! handle.abort();
//! ```

mod client;
mod config;
mod traits;

pub use client::ChatClient;
pub use config::{BackendConfig, DEFAULT_CHAT_PATH, DEFAULT_ENDPOINT};
pub use traits::{collect_reply, ChatBackend, ChatError, SendOptions, StreamHandle};
