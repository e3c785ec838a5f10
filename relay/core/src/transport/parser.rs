//! Event Frame Parser
//!
//! Classifies one complete line. Backends disagree on framing: some speak a
//! strict event stream (`data: <payload>`), some send bare newline-delimited
//! text. The parser accepts both.
//!
//! # Rules
//!
//! Applied in order:
//! 1. Blank line: discarded.
//! 2. Line starting with `data:`: prefix stripped, payload trimmed.
//! 3. Any other line: the trimmed line is the payload
//!    ([`ParserMode::Tolerant`]) or it is discarded ([`ParserMode::Strict`]).
//! 4. Payload equal to `[DONE]`: [`ParsedFrame::Done`]. The parser latches;
//!    every later line is ignored.
//! 5. Any other non-empty payload: [`ParsedFrame::Data`].
//!
//! Tolerant mode also turns stray lines from intermediaries (`event:`,
//! `id:`, comments) into payloads. Strict mode exists for backends known to
//! send proper event streams through such proxies.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix of a data line
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// How lines without the `data:` prefix are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserMode {
    /// Unprefixed lines are payloads
    #[default]
    Tolerant,
    /// Unprefixed lines are discarded
    Strict,
}

impl FromStr for ParserMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerant" => Ok(Self::Tolerant),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown parser mode '{other}'")),
        }
    }
}

impl std::fmt::Display for ParserMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tolerant => write!(f, "tolerant"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// A classified line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedFrame {
    /// Response payload
    Data(String),
    /// Termination sentinel
    Done,
}

/// Per-session line classifier
#[derive(Debug, Default)]
pub struct EventFrameParser {
    mode: ParserMode,
    finished: bool,
}

impl EventFrameParser {
    /// Create a parser in the given mode
    #[must_use]
    pub fn new(mode: ParserMode) -> Self {
        Self {
            mode,
            finished: false,
        }
    }

    /// Classify one line; `None` means the line produces nothing
    pub fn parse(&mut self, line: &str) -> Option<ParsedFrame> {
        if self.finished {
            return None;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let payload = match trimmed.strip_prefix(DATA_PREFIX) {
            Some(rest) => rest.trim(),
            None if self.mode == ParserMode::Tolerant => trimmed,
            None => {
                tracing::trace!(line = trimmed, "Discarding unprefixed line");
                return None;
            }
        };

        if payload.is_empty() {
            return None;
        }

        if payload == DONE_SENTINEL {
            self.finished = true;
            return Some(ParsedFrame::Done);
        }

        Some(ParsedFrame::Data(payload.to_owned()))
    }

    /// Whether the sentinel has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
