//! Frame Buffer
//!
//! Protocol frames are newline-delimited, and network chunks never line up
//! with line boundaries. The buffer keeps the trailing partial line across
//! calls and hands out only complete lines.
//!
//! # Line Endings
//!
//! Both `\n` and `\r\n` terminate a line. The `\r` is stripped even when it
//! arrived in an earlier fragment than its `\n`.
//!
//! # Limits
//!
//! A line may not grow beyond `max_line_bytes`. Without the limit a backend
//! that never sends a newline would grow the buffer without bound.

use super::TransportError;

/// Default maximum line length (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Line accumulator for decoded text
#[derive(Debug)]
pub struct FrameBuffer {
    partial: String,
    max_line_bytes: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl FrameBuffer {
    /// Create a buffer enforcing the given line limit
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            partial: String::new(),
            max_line_bytes,
        }
    }

    /// Append a fragment and return every line it completed
    ///
    /// Blank lines are returned as empty strings.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::FrameTooLarge` if a line exceeds the limit.
    /// Lines completed before the oversized one are lost; use
    /// [`FrameBuffer::push_into`] to keep them.
    pub fn push(&mut self, fragment: &str) -> Result<Vec<String>, TransportError> {
        let mut lines = Vec::new();
        self.push_into(fragment, &mut lines)?;
        Ok(lines)
    }

    /// Append a fragment, writing completed lines into `lines`
    ///
    /// On error, `lines` still holds every line completed before the
    /// oversized one, in order.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::FrameTooLarge` if a line exceeds the limit.
    /// The buffered partial line is discarded.
    pub fn push_into(
        &mut self,
        fragment: &str,
        lines: &mut Vec<String>,
    ) -> Result<(), TransportError> {
        for piece in fragment.split_inclusive('\n') {
            match piece.strip_suffix('\n') {
                Some(rest) => {
                    self.partial.push_str(rest);
                    self.check_limit()?;
                    let mut line = std::mem::take(&mut self.partial);
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    lines.push(line);
                }
                None => {
                    self.partial.push_str(piece);
                    self.check_limit()?;
                }
            }
        }
        Ok(())
    }

    /// Take the trailing partial line at end of stream
    ///
    /// Returns `None` when nothing is buffered, so a second call after a
    /// successful flush is always `None`.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.partial);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }

    /// Bytes currently held for the partial line
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.partial.len()
    }

    fn check_limit(&mut self) -> Result<(), TransportError> {
        let len = self.partial.len();
        if len > self.max_line_bytes {
            self.partial.clear();
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_line_bytes,
            });
        }
        Ok(())
    }
}
