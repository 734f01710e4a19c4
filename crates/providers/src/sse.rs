//! Incremental parsers for streamed model responses.
//!
//! Two framings show up upstream:
//! - SSE (OpenAI): events separated by `\n\n`, each holding optional `event:`
//!   and `data:` lines.
//! - NDJSON (Ollama): one JSON object per line.
//!
//! Both buffer raw bytes so a multi-byte character split across network
//! chunks is decoded intact.

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Splits a byte stream into complete lines, without the terminator.
#[derive(Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn raw_lines(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let Some(last) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buffer.drain(..=last).collect();
        String::from_utf8_lossy(&complete[..last])
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect()
    }

    /// Complete lines in `chunk`, trimmed, blanks dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.raw_lines(chunk)
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Whatever is left once the stream has ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Line-driven SSE decoder. A blank line dispatches the pending event.
#[derive(Default)]
pub struct SseParser {
    lines: LineBuffer,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for line in self.lines.raw_lines(chunk) {
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    out.push(event);
                }
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line.as_str(), ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => self.event = Some(value.trim().to_string()),
                "data" => self.data.push(value.to_string()),
                // id, retry and ":" comments
                _ => {}
            }
        }
        out
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}
