//! Stream Decoder
//!
//! Incremental UTF-8 decoding for network chunks. Chunk boundaries fall
//! wherever the network put them, so a multi-byte character can arrive in
//! two (or four) pieces. The decoder holds back an incomplete trailing
//! sequence until the rest of it arrives.
//!
//! Malformed input never fails the stream: an invalid sequence becomes
//! U+FFFD and decoding carries on after it.

use std::char::REPLACEMENT_CHARACTER;

/// Incremental UTF-8 decoder with carry-over between calls
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes of an incomplete trailing sequence
    pending: Vec<u8>,
}

impl StreamDecoder {
    /// Create a decoder with no carried state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk
    ///
    /// With `is_final = false`, an incomplete sequence at the end of the
    /// chunk is carried into the next call. With `is_final = true`, it is
    /// replaced by U+FFFD and the decoder is left empty.
    pub fn decode(&mut self, chunk: &[u8], is_final: bool) -> String {
        // Fast path: nothing carried and the chunk is complete UTF-8
        if self.pending.is_empty() {
            if let Ok(text) = std::str::from_utf8(chunk) {
                return text.to_owned();
            }
        }

        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    start = valid_end;

                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            start += len;
                        }
                        None if is_final => {
                            out.push(REPLACEMENT_CHARACTER);
                            start = self.pending.len();
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush carried state at end of stream
    pub fn finish(&mut self) -> String {
        self.decode(&[], true)
    }

    /// Number of bytes held back for the next call
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
