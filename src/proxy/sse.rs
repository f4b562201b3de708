//! SSE frame parsing with chunk-boundary reassembly.
//!
//! The upstream transport delivers byte chunks with no alignment guarantee
//! against the underlying event boundaries. [`FrameParser`] buffers raw
//! bytes across chunks, splits only on confirmed newlines, and classifies
//! each complete line. Malformed JSON on a data line is a silent-drop
//! event, not an escalated error.

use serde_json::Value;

/// Residual buffer cap. A single line longer than this is discarded.
const MAX_BUFFER_BYTES: usize = 64 * 1024;

/// One logical server-sent event worth forwarding.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `data:` line carrying a parsed JSON payload.
    Data(Value),
    /// The `data: [DONE]` terminal sentinel.
    Done,
}

/// Incremental line buffer over the upstream byte stream.
///
/// One instance per in-flight streaming response.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed one transport chunk; returns the frames it completed.
    ///
    /// A trailing partial line stays in the buffer until a later chunk
    /// supplies its newline.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = classify_line(&line) {
                frames.push(frame);
            }
        }

        if self.buffer.len() > MAX_BUFFER_BYTES {
            tracing::warn!(
                len = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }

        frames
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        classify_line(&line)
    }
}

/// Classify one complete line: data frame, terminal sentinel, or ignorable.
///
/// Blank lines, comments, and other SSE fields (`event:`, `id:`, `retry:`)
/// carry nothing the proxy forwards; they return `None`. So do data lines
/// whose payload fails to parse as JSON.
fn classify_line(raw: &[u8]) -> Option<SseFrame> {
    let line = std::str::from_utf8(raw).ok()?;
    let line = line.trim_end_matches(['\n', '\r']);

    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == "[DONE]" {
        return Some(SseFrame::Done);
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => Some(SseFrame::Data(value)),
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed SSE data frame");
            None
        }
    }
}
