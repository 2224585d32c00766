//! Decoding of the llama.cpp completion stream.
//!
//! With `"stream": true` the server answers with server-sent-event style
//! lines, one JSON object per frame:
//! ```text
//! data: {"content":"A","stop":false,...}
//!
//! data: {"content":" cat","stop":false,...}
//!
//! data: {"content":"","stop":true,...}
//! ```
//! Transport chunks do not line up with frames, so bytes are buffered until a
//! full line is available. Lines that are not well-formed frames are reported
//! as [`FrameError`] and the caller skips them.

use crate::models::CompletionChunk;

pub const DATA_MARKER: &str = "data: ";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame does not start with the data marker")]
    MissingMarker,

    #[error("frame is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed frame payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Extract the text carried by one frame line.
///
/// Returns `Ok(None)` for a well-formed frame with empty content.
pub fn parse_frame(line: &[u8]) -> Result<Option<String>, FrameError> {
    let line = std::str::from_utf8(line)?;
    let payload = line
        .strip_prefix(DATA_MARKER)
        .ok_or(FrameError::MissingMarker)?;
    let chunk: CompletionChunk = serde_json::from_str(payload)?;

    Ok(Some(chunk.content).filter(|content| !content.is_empty()))
}

/// Longest line kept while waiting for its newline. Longer lines are dropped.
pub const MAX_LINE_BYTES: usize = 256 * 1024;

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    // inside an oversized line, skipping up to the next newline
    discarding: bool,
    dropped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and take every line it completes, in order.
    /// Blank separator lines are dropped, so are lines over [`MAX_LINE_BYTES`].
    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        while let Some(pos) = chunk.iter().position(|b| *b == b'\n') {
            let head = &chunk[..pos];
            chunk = &chunk[pos + 1..];

            if self.discarding {
                self.discarding = false;
            } else if self.buf.len() + head.len() > MAX_LINE_BYTES {
                self.drop_line();
            } else {
                self.buf.extend_from_slice(head);
                if let Some(line) = non_blank(std::mem::take(&mut self.buf)) {
                    lines.push(line);
                }
            }
        }

        if !self.discarding {
            if self.buf.len() + chunk.len() > MAX_LINE_BYTES {
                self.drop_line();
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(chunk);
            }
        }
        lines
    }

    /// Whatever is left once the upstream closed, as a final line.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        non_blank(std::mem::take(&mut self.buf))
    }

    /// Bytes held for the line still in progress.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Number of oversized lines dropped since the last call.
    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    fn drop_line(&mut self) {
        self.buf.clear();
        self.dropped += 1;
    }
}

fn non_blank(mut line: Vec<u8>) -> Option<Vec<u8>> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(line)
    }
}
