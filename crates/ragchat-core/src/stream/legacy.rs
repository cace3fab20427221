use std::sync::OnceLock;

use regex::Regex;

use super::{EventDecoder, StreamEvent, Utf8Carry};

/// Pattern-matching decoder for the older pseudo-JSON stream.
///
/// Each `data: {content: '...'}` fragment (either quote style, key quoted
/// or bare) yields one content event. After a pass, everything up to the end
/// of the last match is discarded and the rest waits for the next chunk.
#[derive(Debug, Default)]
pub struct LegacyDecoder {
    text: Utf8Carry,
    buffer: String,
}

impl LegacyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut last_end = 0;

        for caps in fragment_pattern().captures_iter(&self.buffer) {
            let raw = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            events.push(StreamEvent::Content(unescape(raw)));
            if let Some(whole) = caps.get(0) {
                last_end = whole.end();
            }
        }

        if last_end > 0 {
            self.buffer.drain(..last_end);
        }
        events
    }
}

impl EventDecoder for LegacyDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let text = self.text.decode(chunk);
        self.buffer.push_str(&text);
        self.scan()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = self.text.flush();
        self.buffer.push_str(&rest);
        let events = self.scan();
        if !self.buffer.trim().is_empty() {
            tracing::debug!(leftover = %self.buffer, "legacy stream ended with unmatched text");
        }
        self.buffer.clear();
        events
    }

    // No terminator in this format; the transport closing ends it.
    fn is_done(&self) -> bool {
        false
    }
}

fn fragment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?s)data:\s*\{\s*(?:'content'|"content"|content)\s*:\s*(?:'(.*?)'|"(.*?)")\s*\}"#,
        )
        .expect("valid regex")
    })
}

/// Applied in this order; `\\` is handled before the quote escapes.
fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\r", "\r")
        .replace("\\\\", "\\")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
}
