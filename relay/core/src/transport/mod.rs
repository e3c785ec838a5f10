//! Transport Layer for Chat Backends
//!
//! Everything between the network primitive and a parsed protocol frame:
//! - [`HttpTransport`]: the network primitive (POST returning a byte stream)
//! - [`ReqwestTransport`]: the default primitive over `reqwest`
//! - [`StreamDecoder`]: incremental UTF-8 decoding across chunk boundaries
//! - [`FrameBuffer`]: turns text fragments into complete lines
//! - [`EventFrameParser`]: classifies a line as data, sentinel, or noise
//!
//! # Pipeline
//!
//! ```text
//! bytes ──► StreamDecoder ──► FrameBuffer ──► EventFrameParser ──► ParsedFrame
//!  (network)    (text)          (lines)          (Data / Done)
//! ```
//!
//! The pipeline holds no I/O of its own. The same three stages serve any
//! primitive that yields byte chunks, which keeps the session loop and its
//! tests independent of `reqwest`.

pub mod decoder;
pub mod frame;
pub mod http;
pub mod parser;
pub mod traits;

// Re-exports for convenience
pub use decoder::StreamDecoder;
pub use frame::{FrameBuffer, DEFAULT_MAX_LINE_BYTES};
pub use http::ReqwestTransport;
pub use parser::{EventFrameParser, ParsedFrame, ParserMode, DATA_PREFIX, DONE_SENTINEL};
pub use traits::{ByteStream, HttpTransport, TransportError, TransportRequest, TransportResponse};
