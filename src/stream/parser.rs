//! # Chunk Parser
//! Reassembles protocol lines from transport chunks whose boundaries have no
//! relation to message boundaries.
//!
//! [`LineBuffer`] keeps the unterminated tail of the previous chunk and
//! prepends it to the next one, so a line split across any number of chunks
//! (even inside a multi-byte UTF-8 sequence) is decoded exactly once.
//! [`parse_chunk`] is the stateless per-chunk split; it loses split lines and
//! is only suitable when the caller already holds whole messages.

use crate::stream::event::{decode_line, StreamEvent};

/// Carry-over buffer producing complete lines from byte chunks.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let Some(last_nl) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..=last_nl).collect();
        // the final split element is the empty remainder after the last '\n'
        let mut lines: Vec<String> = complete
            .split(|b| *b == b'\n')
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .collect();
        lines.pop();
        lines
    }

    /// Flush whatever is left once the transport has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

/// Stream-level parser: [`LineBuffer`] + [`decode_line`].
///
/// One parser per stream; call [`ChunkParser::reset`] before reusing it.
#[derive(Debug, Default, Clone)]
pub struct ChunkParser {
    lines: LineBuffer,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.push_bytes(chunk.as_bytes())
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.lines
            .push(chunk)
            .iter()
            .filter_map(|line| decode_line(line))
            .collect()
    }

    /// Decode a trailing line the server never terminated.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        self.lines.finish().and_then(|line| decode_line(&line))
    }

    pub fn pending_len(&self) -> usize {
        self.lines.pending_len()
    }

    pub fn reset(&mut self) {
        self.lines.reset();
    }
}

/// Stateless split of a single chunk. Lines cut at either edge are dropped.
pub fn parse_chunk(text: &str) -> Vec<StreamEvent> {
    text.split('\n').filter_map(decode_line).collect()
}
