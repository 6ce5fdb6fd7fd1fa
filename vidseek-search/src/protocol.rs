//! Wire protocol for streaming search results.
//!
//! Each event is one JSON object on a server-sent events `data:` line,
//! followed by a blank line. The stream is unidirectional; closing the
//! transport is the authoritative end of a session, `complete` is only a
//! courtesy.

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::types::VideoRecord;

/// One event of a search session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    /// Always first; `total_sources` never changes afterwards.
    Start { total_sources: usize },

    /// A page that yielded at least one record.
    Videos {
        source: String,
        videos: Vec<VideoRecord>,
        completed_sources: usize,
        total_sources: usize,
        /// Latency of the settling attempt, in milliseconds
        latency: u64,
        #[serde(default = "first_page")]
        page: u32,
    },

    /// Counters after a page settled, whatever its outcome.
    Progress {
        completed_sources: usize,
        total_sources: usize,
        total_videos_found: usize,
    },

    /// All work settled (or the session deadline passed).
    Complete {
        total_videos_found: usize,
        total_sources: usize,
        max_page_count: u32,
    },

    /// Request-level failure; the stream closes right after.
    Error { message: String },
}

fn first_page() -> u32 {
    1
}

impl StreamEvent {
    /// Event name as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Videos { .. } => "videos",
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Returns true for events after which nothing else is sent.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Encodes one event as an SSE frame.
///
/// # Errors
///
/// - `ProtocolError::Malformed` - If the event cannot be serialized
pub fn encode_sse(event: &StreamEvent) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(event).map_err(|e| ProtocolError::Malformed {
        reason: e.to_string(),
    })?;
    Ok(format!("data: {json}\n\n"))
}

/// Parses the payload of one `data:` field.
///
/// # Errors
///
/// - `ProtocolError::Malformed` - Payload is not a known event
pub fn parse_event(data: &str) -> Result<StreamEvent, ProtocolError> {
    serde_json::from_str(data).map_err(|e| ProtocolError::Malformed {
        reason: e.to_string(),
    })
}

/// Longest line the decoder buffers before giving up on its frame.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Incremental SSE decoder.
///
/// Accepts arbitrary chunk boundaries, including ones that split a line or
/// a multi-byte character, and both `\n` and `\r\n` line endings. Comment
/// lines and fields other than `data` are ignored. Multiple `data` lines in
/// one frame are joined with `\n`.
///
/// A line longer than the limit is discarded together with the frame it
/// belongs to; decoding resumes after the next blank line.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    max_line_bytes: usize,
    skipping_line: bool,
    skipping_frame: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            data: Vec::new(),
            max_line_bytes: MAX_LINE_BYTES,
            skipping_line: false,
            skipping_frame: false,
        }
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Feeds a chunk, returning the payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.buffer[consumed..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            consumed = end + 1;

            if self.skipping_line {
                self.skipping_line = false;
                continue;
            }
            if self.skipping_frame {
                self.skipping_frame = !line.is_empty();
                continue;
            }
            if let Some(frame) = self.take_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > self.max_line_bytes {
            if !self.skipping_line {
                tracing::warn!(
                    pending_bytes = self.buffer.len(),
                    limit = self.max_line_bytes,
                    "Dropping SSE frame with oversized line"
                );
            }
            self.buffer.clear();
            self.data.clear();
            self.skipping_line = true;
            self.skipping_frame = true;
        }

        frames
    }

    /// Flushes a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if self.skipping_line || self.skipping_frame {
            self.buffer.clear();
            self.skipping_line = false;
            self.skipping_frame = false;
            return None;
        }
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_string();
            self.take_line(&line);
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let frame = self.data.join("\n");
        self.data.clear();
        Some(frame)
    }
}
