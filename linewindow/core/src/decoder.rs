//! Incremental Line Decoder
//!
//! Turns raw byte chunks into complete text lines. Chunks arrive with
//! arbitrary boundaries: a line may span several chunks and a multi-byte
//! UTF-8 code point may be split between two of them. The decoder carries
//! both kinds of residue between calls, so feeding a byte sequence in any
//! partition yields exactly the lines a single whole-buffer feed would.
//!
//! # Carry State
//!
//! ```text
//!   chunk N                      chunk N+1
//! ┌───────────────────────┐    ┌───────────────────────┐
//! │ ...line\nparti  [E2 82]│ -> │[AC] al\nnext...        │
//! └──────────────┬───┬────┘    └───────────────────────┘
//!                │   └── pending: undecoded tail bytes
//!                └────── carry: decoded, unterminated text
//! ```

use thiserror::Error;

/// Default upper bound for a single unterminated line (64 KiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// How invalid UTF-8 is handled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Utf8Policy {
    /// Replace each invalid sequence with U+FFFD and keep going
    #[default]
    Lossy,
    /// Fail the decode on the first invalid sequence
    Strict,
}

/// Decoder tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Invalid UTF-8 handling
    pub utf8: Utf8Policy,
    /// Longest unterminated line accepted before failing
    pub max_line_bytes: usize,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            utf8: Utf8Policy::Lossy,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Errors raised while decoding a stream
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Invalid UTF-8 under [`Utf8Policy::Strict`]
    #[error("invalid UTF-8 at stream offset {offset}")]
    InvalidUtf8 {
        /// Absolute byte offset of the offending sequence
        offset: u64,
    },

    /// Stream ended inside a multi-byte sequence under [`Utf8Policy::Strict`]
    #[error("stream ended with {pending} byte(s) of an incomplete UTF-8 sequence")]
    TruncatedSequence {
        /// Number of dangling bytes
        pending: usize,
    },

    /// An unterminated line outgrew the configured limit
    #[error("line exceeds {limit} bytes without a terminator")]
    LineTooLong {
        /// The configured limit
        limit: usize,
    },
}

/// Returns true for lines that are empty once surrounding whitespace is trimmed
#[must_use]
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Streaming UTF-8 line decoder
///
/// Owned by exactly one session; holds no state other than its carry.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Trailing bytes of an incomplete code point
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    carry: String,
    /// Total bytes consumed, for error offsets
    consumed: u64,
    options: DecoderOptions,
}

impl LineDecoder {
    /// Create a decoder with default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with custom options
    #[must_use]
    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Bytes currently held back (undecoded tail plus unterminated text)
    #[must_use]
    pub fn carried_bytes(&self) -> usize {
        self.pending.len() + self.carry.len()
    }

    /// Feed one chunk and return every line it completed
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`).
    /// Blank lines are returned as well; filtering is the caller's call.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] under the strict policy and
    /// [`DecodeError::LineTooLong`] when the carry outgrows its limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, DecodeError> {
        let text = self.decode(chunk)?;
        self.carry.push_str(&text);
        let lines = self.drain_lines();

        if self.carry.len() > self.options.max_line_bytes {
            return Err(DecodeError::LineTooLong {
                limit: self.options.max_line_bytes,
            });
        }

        Ok(lines)
    }

    /// Flush at end-of-stream
    ///
    /// Returns the trailing unterminated segment, if any. Dangling bytes of
    /// an incomplete code point become U+FFFD under the lossy policy.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TruncatedSequence`] under the strict policy
    /// when the stream stopped mid code point.
    pub fn finish(&mut self) -> Result<Option<String>, DecodeError> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            match self.options.utf8 {
                Utf8Policy::Strict => {
                    return Err(DecodeError::TruncatedSequence {
                        pending: pending.len(),
                    });
                }
                Utf8Policy::Lossy => self.carry.push_str(&String::from_utf8_lossy(&pending)),
            }
        }

        if self.carry.is_empty() {
            return Ok(None);
        }

        let mut last = std::mem::take(&mut self.carry);
        if last.ends_with('\r') {
            last.pop();
        }
        Ok(Some(last))
    }

    /// Decode `pending + chunk`, holding back an incomplete trailing sequence
    fn decode(&mut self, chunk: &[u8]) -> Result<String, DecodeError> {
        let mut bytes = std::mem::take(&mut self.pending);
        let base_offset = self.consumed - bytes.len() as u64;
        bytes.extend_from_slice(chunk);
        self.consumed += chunk.len() as u64;

        let mut out = String::with_capacity(bytes.len());
        let mut pos = 0;

        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let valid_end = pos + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&bytes[pos..valid_end]));

                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk
                        None => {
                            self.pending = bytes[valid_end..].to_vec();
                            break;
                        }
                        Some(len) => {
                            if self.options.utf8 == Utf8Policy::Strict {
                                return Err(DecodeError::InvalidUtf8 {
                                    offset: base_offset + valid_end as u64,
                                });
                            }
                            out.push(char::REPLACEMENT_CHARACTER);
                            pos = valid_end + len;
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Split complete lines off the front of the carry
    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(rel) = self.carry[start..].find('\n') {
            let end = start + rel;
            let line = &self.carry[start..end];
            lines.push(line.strip_suffix('\r').unwrap_or(line).to_string());
            start = end + 1;
        }

        self.carry.drain(..start);
        lines
    }
}
