//! Line framing for the worker's output stream.
//!
//! Worker stdout arrives in arbitrary chunks. [`LineFramer`] buffers bytes
//! until a full line is assembled and classifies it:
//! - a line containing `[REVIEW]` pauses the worker for one decision line
//! - a line containing `[DONE]` marks a chapter finished without review
//! - anything else is chapter content
//!
//! Markers split across chunk boundaries are detected once the line completes.

use std::fmt;

use crate::chapter::ChapterId;
use crate::review::ReviewDecision;

pub const REVIEW_MARKER: &str = "[REVIEW]";
pub const DONE_MARKER: &str = "[DONE]";

/// A complete, classified line of worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// One line of chapter content, without its line terminator
    Content(String),
    /// The worker has finished a draft and waits for a decision token
    ReviewSignal,
    /// The worker finished the current chapter and needs no decision
    ChapterDone,
}

/// A line the controller writes to the worker's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Generate(ChapterId),
    Decision(ReviewDecision),
}

impl WorkerCommand {
    /// The line written to the worker, without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            WorkerCommand::Generate(id) => format!("generate {}", id),
            WorkerCommand::Decision(decision) => decision.token().to_string(),
        }
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Classify a single complete line.
pub fn classify_line(line: &str) -> WorkerEvent {
    if line.contains(REVIEW_MARKER) {
        WorkerEvent::ReviewSignal
    } else if line.contains(DONE_MARKER) {
        WorkerEvent::ChapterDone
    } else {
        WorkerEvent::Content(line.to_string())
    }
}

/// Longest line buffered before it is passed on in pieces.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Reassembles lines from arbitrarily split output chunks.
///
/// Bytes are buffered rather than text so multi-byte UTF-8 sequences split
/// across chunks decode correctly. Each byte is scanned for a terminator
/// once. A line that grows past the length cap is emitted as content in
/// cap-sized pieces, so markers must sit on reasonably short lines.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline
    scanned: usize,
    max_line: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            max_line: max_line.max(4),
        }
    }

    /// Feed a chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<WorkerEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.pending[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            events.push(classify_line(&decode_line(&self.pending[start..end])));
            start = end + 1;
            cursor = start;
        }
        self.pending.drain(..start);

        while self.pending.len() >= self.max_line {
            let cut = char_boundary(&self.pending, self.max_line);
            let piece: Vec<u8> = self.pending.drain(..cut).collect();
            events.push(classify_line(&decode_line(&piece)));
        }
        self.scanned = self.pending.len();
        events
    }

    /// Flush an unterminated final line at end of stream.
    pub fn finish(&mut self) -> Option<WorkerEvent> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(classify_line(&decode_line(&line)))
    }
}

/// Largest cut at or below `limit` that does not split a UTF-8 sequence.
fn char_boundary(bytes: &[u8], limit: usize) -> usize {
    let mut cut = limit.min(bytes.len());
    while cut > 0 && cut < bytes.len() && (bytes[cut] & 0xC0) == 0x80 {
        cut -= 1;
    }
    if cut == 0 { limit } else { cut }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
