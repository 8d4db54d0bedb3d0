//! Line-oriented reading of child process output.
//!
//! Reads from a pipe never line up with line boundaries, so [`LineBuffer`]
//! holds the unterminated tail of each chunk until its newline arrives.
//! Lines are decoded only once complete, which also keeps multi-byte UTF-8
//! sequences split across reads intact.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes requested per read from the pipe.
const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// Splits a byte stream into lines, buffering partial lines across pushes.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(decode(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the unterminated tail at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(decode(&tail))
    }
}

fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ---------------------------------------------------------------------------
// read_lines
// ---------------------------------------------------------------------------

/// Read `reader` to EOF, calling `on_line` once per line in order.
///
/// A missing handle (the pipe was not captured) reads as an empty stream.
pub async fn read_lines<R, F>(reader: Option<R>, mut on_line: F) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let Some(mut reader) = reader else {
        return Ok(());
    };

    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        for line in buffer.push(&chunk[..n]) {
            on_line(line);
        }
    }

    if let Some(tail) = buffer.finish() {
        on_line(tail);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
