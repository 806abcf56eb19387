//! Line scanner for the messages event stream.
//!
//! The wire format is line oriented: `data: ` lines carry JSON frame
//! payloads and the bare `event: error` line fails the stream. Every other
//! line (blank separators, other `event:` lines, comments) carries nothing.

/// One meaningful line scanned out of the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Payload of a `data: ` line.
    Data(String),
    /// The explicit `event: error` line.
    ErrorEvent,
}

/// Incremental scanner that buffers partial lines across network chunks.
#[derive(Debug, Default)]
pub struct SseLineScanner {
    buffer: String,
}

impl SseLineScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one network chunk and returns the meaningful lines it
    /// completed, in arrival order.
    pub fn push(&mut self, chunk: &str) -> Vec<SseLine> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let raw: String = self.buffer.drain(..=newline).collect();
            if let Some(line) = classify_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flushes a trailing line that never received its newline.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        classify_line(&raw)
    }
}

fn classify_line(raw: &str) -> Option<SseLine> {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(payload) = line.strip_prefix("data: ") {
        return Some(SseLine::Data(payload.to_string()));
    }
    if line == "event: error" {
        return Some(SseLine::ErrorEvent);
    }
    None
}
