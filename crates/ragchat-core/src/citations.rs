//! Display numbering for citations.
//!
//! Numbers are derived from the log on every call rather than stored: walk
//! messages oldest to newest and each message's sources in order, counting
//! from 1. The inline badges and the flattened list both come from
//! [`numbered_sources`], so they always agree.

use crate::state::{Message, Source};

/// Position of a source inside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub message: usize,
    pub source: usize,
}

impl SourceRef {
    pub fn resolve<'a>(&self, messages: &'a [Message]) -> Option<&'a Source> {
        messages.get(self.message)?.sources.get(self.source)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NumberedSource<'a> {
    pub number: usize,
    pub at: SourceRef,
    pub source: &'a Source,
}

pub fn numbered_sources(messages: &[Message]) -> impl Iterator<Item = NumberedSource<'_>> {
    messages
        .iter()
        .enumerate()
        .flat_map(|(m, message)| {
            message
                .sources
                .iter()
                .enumerate()
                .map(move |(s, source)| (SourceRef { message: m, source: s }, source))
        })
        .enumerate()
        .map(|(i, (at, source))| NumberedSource {
            number: i + 1,
            at,
            source,
        })
}

/// Badge numbers for each message's sources, indexed like the log.
pub fn inline_numbers(messages: &[Message]) -> Vec<Vec<usize>> {
    let mut numbers: Vec<Vec<usize>> = messages.iter().map(|_| Vec::new()).collect();
    for entry in numbered_sources(messages) {
        numbers[entry.at.message].push(entry.number);
    }
    numbers
}

/// Every source in the log, numbered, for the side panel.
pub fn flattened(messages: &[Message]) -> Vec<NumberedSource<'_>> {
    numbered_sources(messages).collect()
}

pub fn number_of(messages: &[Message], at: SourceRef) -> Option<usize> {
    numbered_sources(messages)
        .find(|entry| entry.at == at)
        .map(|entry| entry.number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn source(id: &str) -> Source {
        Source {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn bot_with(ids: &[&str]) -> Message {
        let mut message = Message::bot();
        message.sources = ids.iter().map(|id| source(id)).collect();
        message
    }

    fn log() -> Vec<Message> {
        vec![
            Message::user("q1"),
            bot_with(&["s1", "s2"]),
            Message::user("q2"),
            bot_with(&["s3"]),
        ]
    }

    #[test]
    fn test_inline_numbering() {
        assert_eq!(inline_numbers(&log()), vec![vec![], vec![1, 2], vec![], vec![3]]);
    }

    #[test]
    fn test_flattened_matches_inline() {
        let messages = log();
        let flat: Vec<(usize, &str)> = flattened(&messages)
            .iter()
            .map(|e| (e.number, e.source.id.as_str()))
            .collect();
        assert_eq!(flat, vec![(1, "s1"), (2, "s2"), (3, "s3")]);

        let inline = inline_numbers(&messages);
        for entry in flattened(&messages) {
            assert_eq!(inline[entry.at.message][entry.at.source], entry.number);
        }
    }

    #[test]
    fn test_numbers_stable_when_sources_appended() {
        let mut messages = log();
        let before = number_of(&messages, SourceRef { message: 3, source: 0 });
        messages.push(Message::user("q3"));
        messages.push(bot_with(&["s4"]));

        assert_eq!(number_of(&messages, SourceRef { message: 3, source: 0 }), before);
        assert_eq!(number_of(&messages, SourceRef { message: 5, source: 0 }), Some(4));
    }

    #[test]
    fn test_resolve() {
        let messages = log();
        let at = SourceRef { message: 1, source: 1 };
        assert_eq!(at.resolve(&messages).map(|s| s.id.as_str()), Some("s2"));
        assert!(SourceRef { message: 9, source: 0 }.resolve(&messages).is_none());
    }
}
