use serde::Deserialize;
use serde_json::Value;

use super::{EventDecoder, StreamEvent, Utf8Carry, DONE_TOKEN};
use crate::state::Source;

const DATA_PREFIX: &str = "data: ";

/// Line-oriented `data: <json>` decoder.
#[derive(Debug, Default)]
pub struct StructuredDecoder {
    text: Utf8Carry,
    buffer: String,
    done: bool,
}

impl StructuredDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain complete lines from the buffer, stopping at the terminator.
    fn drain_lines(&mut self, events: &mut Vec<StreamEvent>) {
        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            match decode_line(line) {
                Some(StreamEvent::Done) => {
                    self.finish_with_done(events);
                    return;
                }
                Some(event) => events.push(event),
                None => {}
            }
        }
    }

    fn finish_with_done(&mut self, events: &mut Vec<StreamEvent>) {
        self.done = true;
        self.buffer.clear();
        events.push(StreamEvent::Done);
    }
}

impl EventDecoder for StructuredDecoder {
    fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let text = self.text.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_lines(&mut events);
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        let rest = self.text.flush();
        self.buffer.push_str(&rest);
        self.drain_lines(&mut events);

        // A final record without a trailing newline still counts
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            match decode_line(line.trim_end_matches('\r')) {
                Some(StreamEvent::Done) => self.finish_with_done(&mut events),
                Some(event) => events.push(event),
                None => {}
            }
        }

        events
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

/// Classify one line. Lines without the `data: ` prefix and records that do
/// not parse are dropped.
fn decode_line(line: &str) -> Option<StreamEvent> {
    let payload = line.trim_start().strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_TOKEN {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(record) => classify(&record),
        Err(err) => {
            tracing::debug!(%err, payload, "dropping malformed stream record");
            None
        }
    }
}

fn classify(record: &Value) -> Option<StreamEvent> {
    if let Some(Value::Array(items)) = record.get("sources").filter(|s| is_non_empty_array(s)) {
        return Some(StreamEvent::Sources(read_sources(items)));
    }

    let content = match record.get("content") {
        None | Some(Value::Null) => return None,
        Some(content) => content,
    };

    let text = normalize_content(content);
    if text.is_empty() {
        None
    } else {
        Some(StreamEvent::Content(text))
    }
}

/// Each entry stands alone: one unreadable entry does not cost the others.
fn read_sources(items: &[Value]) -> Vec<Source> {
    items
        .iter()
        .filter_map(|item| match Source::deserialize(item) {
            Ok(source) => Some(source),
            Err(err) => {
                tracing::debug!(%err, "dropping unreadable source entry");
                None
            }
        })
        .collect()
}

fn is_non_empty_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if !items.is_empty())
}

/// Content is either a string or a list of parts; only the first part's
/// `text` is used.
fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => match parts.first().and_then(|p| p.get("text")) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn content(s: &str) -> StreamEvent {
        StreamEvent::Content(s.to_string())
    }

    fn decode_all(chunks: &[&str]) -> Vec<StreamEvent> {
        let mut decoder = StructuredDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.feed(chunk.as_bytes()));
        }
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_content_lines() {
        let events = decode_all(&["data: {\"content\": \"Hel\"}\ndata: {\"content\": \"lo\"}\n"]);
        assert_eq!(events, vec![content("Hel"), content("lo")]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let events = decode_all(&["data: {\"cont", "ent\": \"abc\"}\r", "\ndata: {\"content\": \"d\"}\n"]);
        assert_eq!(events, vec![content("abc"), content("d")]);
    }

    #[test]
    fn test_null_content_is_ignored() {
        let events = decode_all(&["data: {\"content\": null}\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_empty_content_is_ignored() {
        let events = decode_all(&["data: {\"content\": \"\"}\ndata: {\"content\": []}\n"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_done_stops_processing() {
        let mut decoder = StructuredDecoder::new();
        let events = decoder.feed(b"data: {\"content\": \"a\"}\ndata: [DONE]\ndata: {\"content\": \"b\"}\n");

        assert_eq!(events, vec![content("a"), StreamEvent::Done]);
        assert!(decoder.is_done());
        assert!(decoder.feed(b"data: {\"content\": \"c\"}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_malformed_lines_do_not_abort() {
        let events = decode_all(&[
            "data: {not json}\n",
            ": keep-alive\n",
            "event: message\n",
            "data: {\"content\": \"ok\"}\n",
        ]);
        assert_eq!(events, vec![content("ok")]);
    }

    #[test]
    fn test_content_parts_take_first_text() {
        let events = decode_all(&["data: {\"content\": [{\"text\": \"first\"}, {\"text\": \"second\"}]}\n"]);
        assert_eq!(events, vec![content("first")]);
    }

    #[test]
    fn test_non_string_content_is_stringified() {
        let events = decode_all(&["data: {\"content\": 42}\n"]);
        assert_eq!(events, vec![content("42")]);
    }

    #[test]
    fn test_sources_record() {
        let events = decode_all(&[
            "data: {\"sources\": [{\"id\": \"s1\", \"doc_id\": \"d\", \"page_label\": \"2\", \"content\": \"c\", \"bboxes\": [], \"score\": 0.5}]}\n",
        ]);
        match &events[..] {
            [StreamEvent::Sources(sources)] => {
                assert_eq!(sources.len(), 1);
                assert_eq!(sources[0].id, "s1");
                assert_eq!(sources[0].page_label, "2");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    fn source_ids(events: &[StreamEvent]) -> Vec<String> {
        match events {
            [StreamEvent::Sources(sources)] => sources.iter().map(|s| s.id.clone()).collect(),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_sources_with_null_fields_are_kept() {
        let events = decode_all(&[
            "data: {\"sources\": [{\"id\": \"s1\", \"doc_id\": \"d\", \"page_label\": \"2\", \"content\": \"c\", \"bboxes\": [], \"score\": null}]}\n",
            "data: {\"sources\": [{\"id\": \"s2\", \"content\": null}]}\n",
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(source_ids(&events[..1]), vec!["s1"]);
        assert_eq!(source_ids(&events[1..]), vec!["s2"]);
    }

    #[test]
    fn test_one_bad_box_keeps_the_whole_list() {
        let events = decode_all(&[
            "data: {\"sources\": [{\"id\": \"s1\"}, {\"id\": \"s2\", \"bboxes\": [{\"box\": [1, null, 3, 4]}]}]}\n",
        ]);
        assert_eq!(source_ids(&events), vec!["s1", "s2"]);
    }

    #[test]
    fn test_unreadable_entry_is_skipped() {
        let events = decode_all(&["data: {\"sources\": [\"junk\", {\"id\": \"s1\"}]}\n"]);
        assert_eq!(source_ids(&events), vec!["s1"]);
    }

    #[test]
    fn test_empty_sources_fall_through_to_content() {
        let events = decode_all(&["data: {\"sources\": [], \"content\": \"x\"}\n"]);
        assert_eq!(events, vec![content("x")]);
    }

    #[test]
    fn test_trailing_line_without_newline_is_flushed() {
        let events = decode_all(&["data: {\"content\": \"a\"}\ndata: {\"content\": \"tail\"}"]);
        assert_eq!(events, vec![content("a"), content("tail")]);
    }

    #[test]
    fn test_prefix_requires_space() {
        let events = decode_all(&["data:{\"content\": \"x\"}\n"]);
        assert!(events.is_empty());
    }
}
