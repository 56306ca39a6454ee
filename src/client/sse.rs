//! Incremental server-sent events decoder.
//!
//! Network chunks don't respect line boundaries, so bytes are buffered until a
//! full line is available. Only `data:` fields are surfaced; comments, blank
//! lines and other fields (`event:`, `id:`, `retry:`) are skipped.

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A JSON payload
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            // Decode whole lines only so multi-byte characters split across
            // network chunks survive intact
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = Self::parse_line(line.trim_end_matches(['\r', '\n'])) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        Self::parse_line(line.trim_end_matches(['\r', '\n']))
    }

    fn parse_line(line: &str) -> Option<SseFrame> {
        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            Some(SseFrame::Done)
        } else {
            Some(SseFrame::Data(data.to_string()))
        }
    }
}
