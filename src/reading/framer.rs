//! Line framing for the raw receive stream.

use memchr::memchr;
use tracing::debug;

/// Characters an unterminated buffer may hold before it is discarded.
pub const MAX_LINE_LENGTH: usize = 500;

/// Accumulates received bytes and splits them into newline-terminated lines.
///
/// Framing does not depend on how the stream was chunked: the same bytes
/// produce the same lines whatever the split points.
#[derive(Debug, Clone)]
pub struct LineFramer {
    buffer: String,
    max_len: usize,
}

impl LineFramer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: String::new(),
            max_len,
        }
    }

    /// Append a chunk and return every complete, non-empty line it finished.
    ///
    /// Bytes are decoded lossily so malformed sequences never stop the
    /// pipeline. Returned lines are trimmed and exclude the delimiter.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = memchr(b'\n', self.buffer.as_bytes()) {
            let line = self.buffer[..pos].trim().to_string();
            self.buffer.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.buffer.chars().count() > self.max_len {
            debug!(
                "Discarding {} unterminated bytes from line buffer",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        lines
    }

    /// Characters waiting for a terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}
