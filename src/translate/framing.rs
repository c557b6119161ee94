//! Newline framing for backend event streams.
//!
//! Backend bytes arrive in chunks that line up with neither event boundaries
//! nor UTF-8 character boundaries. [`LineFramer`] buffers raw bytes and only
//! decodes a line once its terminating `\n` has been seen.

use bytes::{Buf, BytesMut};

/// Accumulates byte chunks and hands back complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completes, without the `\n`.
    ///
    /// The trailing partial segment stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drain whatever is left once the source has ended.
    ///
    /// Returns `None` when the stream finished on a line boundary.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Bytes currently held back waiting for a newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}
