//! Line framing for streamed provider responses.
//!
//! Providers stream either newline-delimited JSON (Ollama) or Server-Sent
//! Events with `data: {...}` lines (OpenAI-compatible). Both are line based,
//! and a single line may be split across network chunks, so
//! [`LineFramer`] buffers bytes until a full line is available and hands each
//! complete line to a [`Framing`] rule that extracts the JSON payload.

use serde_json::Value;

/// How a complete line maps to a JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON object per line.
    NdJson,
    /// `data: {...}` lines; `event:` lines, comments and `[DONE]` are skipped.
    Sse,
}

impl Framing {
    fn payload(self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let data = match self {
            Framing::NdJson => line,
            Framing::Sse => {
                let data = line
                    .strip_prefix("data:")
                    .map(str::trim_start)?;
                if data == "[DONE]" {
                    return None;
                }
                data
            }
        };
        serde_json::from_str(data).ok()
    }
}

/// Buffers streamed bytes and yields the JSON payload of each complete line.
#[derive(Debug)]
pub struct LineFramer {
    framing: Framing,
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    /// Feed a raw chunk and return the payloads of any lines it completed.
    ///
    /// Bytes are kept raw until a newline arrives, so a UTF-8 sequence split
    /// across chunks is decoded whole.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            values.extend(self.framing.payload(&String::from_utf8_lossy(&line)));
        }
        values
    }

    /// Parse whatever is left after the stream ends without a trailing newline.
    pub fn finish(&mut self) -> Vec<Value> {
        let rest = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&rest)
            .lines()
            .filter_map(|line| self.framing.payload(line))
            .collect()
    }
}
