//! Subprocess output demultiplexing.
//!
//! Terminal progress bars redraw one line in place with a bare carriage
//! return instead of emitting newlines, so splitting only on `\n` would sit
//! on an ever-growing buffer until the bar finishes. [`SegmentBuffer`] cuts
//! the merged byte stream into text segments at the configured boundaries.

/// How subprocess output is cut into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Split on both `\n` and `\r` — full fidelity on in-place redraws.
    Interleaved,
    /// Split on `\n` only. Documented fallback with reduced resolution on
    /// CR-only redraws; those segments arrive once a newline finally shows.
    Lines,
}

/// Incremental splitter over the merged stdout/stderr byte stream.
#[derive(Debug)]
pub struct SegmentBuffer {
    mode: CaptureMode,
    buf: Vec<u8>,
}

impl SegmentBuffer {
    /// Create an empty buffer for the given mode.
    #[must_use]
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            buf: Vec::new(),
        }
    }

    /// Feed a chunk and return every complete segment it unlocked.
    ///
    /// Empty segments (back-to-back separators, `\r\n` pairs) are dropped.
    /// Bytes after the last separator stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut segments = Vec::new();
        loop {
            let split_at = match self.mode {
                CaptureMode::Interleaved => self
                    .buf
                    .iter()
                    .position(|&b| b == b'\n' || b == b'\r'),
                CaptureMode::Lines => self.buf.iter().position(|&b| b == b'\n'),
            };
            let Some(idx) = split_at else { break };
            let segment: Vec<u8> = self.buf.drain(..=idx).collect();
            let text = String::from_utf8_lossy(&segment[..segment.len() - 1]);
            let text = text.trim_end_matches('\r');
            if !text.is_empty() {
                segments.push(text.to_string());
            }
        }
        segments
    }

    /// Drain whatever remains after the stream closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.buf).trim_end_matches('\r').to_string();
        self.buf.clear();
        if text.is_empty() { None } else { Some(text) }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
