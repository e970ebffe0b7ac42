//! Progress stream protocol.
//!
//! A batch is reported as newline-delimited JSON: one `progress` event when a
//! domain starts, then exactly one `result` or `error` event when it ends.
//! [`LineDecoder`] is the consuming half and tolerates arbitrary chunking of
//! the byte stream.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::processor::DomainResult;

/// One line of the progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Processing of `domain` has started.
    Progress { domain: String },
    /// The domain finished; individual snapshots may still carry errors.
    Result { data: DomainResult },
    /// The domain could not be processed at all.
    Error { domain: String, message: String },
}

impl StreamEvent {
    /// Domain the event refers to.
    pub fn domain(&self) -> &str {
        match self {
            Self::Progress { domain } | Self::Error { domain, .. } => domain,
            Self::Result { data } => &data.domain,
        }
    }

    /// `result` and `error` close a domain; `progress` does not.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    /// Encodes the event as a single NDJSON line, trailing newline included.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Longest line [`LineDecoder`] buffers before giving up on it.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Incremental NDJSON decoder.
///
/// Bytes are buffered until a `\n` arrives, so a chunk boundary may fall
/// anywhere, including inside a multi-byte character. Each complete line is
/// parsed on its own; blank lines are ignored and lines that are not a valid
/// event are skipped and counted. A line longer than the limit is dropped
/// as it arrives and counted once.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    max_line: usize,
    /// Inside an oversized line; discard until the next newline.
    overflowed: bool,
    skipped: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self { buffer: Vec::new(), scanned: 0, max_line, overflowed: false, skipped: 0 }
    }

    /// Feeds a chunk and returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let line_end = self.scanned + offset;
            if self.overflowed {
                self.overflowed = false;
            } else if let Some(event) = decode(&self.buffer[line_start..line_end], &mut self.skipped) {
                events.push(event);
            }
            line_start = line_end + 1;
            self.scanned = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            if !self.overflowed {
                tracing::debug!(limit = self.max_line, "dropping oversized stream line");
                self.skipped += 1;
                self.overflowed = true;
            }
            self.buffer.clear();
            self.scanned = 0;
        }

        events
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let line = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if std::mem::take(&mut self.overflowed) {
            return None;
        }
        decode(&line, &mut self.skipped)
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn decode(line: &[u8], skipped: &mut usize) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(_) => {
            *skipped += 1;
            return None;
        }
    };

    if text.is_empty() {
        return None;
    }

    match serde_json::from_str(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream line");
            *skipped += 1;
            None
        }
    }
}
