//! Message log and the reducer that applies stream events to it.

use crate::citations::SourceRef;
use crate::state::{Message, Source};
use crate::stream::StreamEvent;

/// Replaces the reply when the turn fails or is aborted.
pub const FALLBACK_REPLY: &str = "Sorry, something went wrong.";

pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    /// Request issued, nothing received yet
    Sending,
    /// Content and sources may arrive in any order
    Streaming { content: bool, sources: bool },
    Terminated,
}

/// What a successfully applied event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Content,
    /// First source of the attached list, if any
    Sources(Option<SourceRef>),
    Terminated,
}

/// Append-only log with at most one open bot message.
///
/// The open message is tracked by index, set when a turn starts and
/// cleared when it terminates. Events tagged with an older turn id are
/// ignored.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    open: Option<usize>,
    accumulated: String,
    turn: TurnId,
    phase: TurnPhase,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn current_turn(&self) -> TurnId {
        self.turn
    }

    pub fn open_message(&self) -> Option<&Message> {
        self.open.and_then(|i| self.messages.get(i))
    }

    /// Index of the open bot message in the log.
    pub fn open_index(&self) -> Option<usize> {
        self.open
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Append the user message (verbatim, possibly empty) and a fresh open
    /// bot message. Any turn still open is terminated first.
    pub fn start_turn(&mut self, input: &str) -> TurnId {
        if self.open.is_some() {
            tracing::warn!(turn = self.turn, "starting a turn while another is open");
            self.terminate(self.turn);
        }

        self.turn += 1;
        self.messages.push(Message::user(input));
        self.messages.push(Message::bot());
        self.open = Some(self.messages.len() - 1);
        self.accumulated.clear();
        self.phase = TurnPhase::Sending;

        tracing::info!(turn = self.turn, "turn started");
        self.turn
    }

    pub fn apply(&mut self, turn: TurnId, event: StreamEvent) -> Option<Applied> {
        if turn != self.turn {
            tracing::debug!(turn, current = self.turn, "ignoring event for stale turn");
            return None;
        }
        let index = self.open?;

        match event {
            StreamEvent::Content(delta) => {
                self.accumulated.push_str(&delta);
                let message = self.messages.get_mut(index)?;
                message.text = self.accumulated.clone();
                message.raw = self.accumulated.clone();
                self.mark_streaming(true, false);
                Some(Applied::Content)
            }
            StreamEvent::Sources(sources) => Some(Applied::Sources(self.attach_sources(index, sources))),
            StreamEvent::Done => {
                self.terminate(turn);
                Some(Applied::Terminated)
            }
        }
    }

    fn attach_sources(&mut self, index: usize, sources: Vec<Source>) -> Option<SourceRef> {
        let first = if sources.is_empty() {
            None
        } else {
            Some(SourceRef {
                message: index,
                source: 0,
            })
        };
        if let Some(message) = self.messages.get_mut(index) {
            message.sources = sources;
        }
        self.mark_streaming(false, true);
        first
    }

    fn mark_streaming(&mut self, content: bool, sources: bool) {
        self.phase = match self.phase {
            TurnPhase::Streaming {
                content: had_content,
                sources: had_sources,
            } => TurnPhase::Streaming {
                content: had_content || content,
                sources: had_sources || sources,
            },
            _ => TurnPhase::Streaming { content, sources },
        };
    }

    /// Replace the open reply with the fallback text and close the turn.
    pub fn fail(&mut self, turn: TurnId) -> bool {
        if turn != self.turn {
            return false;
        }
        let Some(index) = self.open else {
            return false;
        };
        if let Some(message) = self.messages.get_mut(index) {
            message.text = FALLBACK_REPLY.to_string();
            message.raw = FALLBACK_REPLY.to_string();
        }
        self.accumulated.clear();
        self.terminate(turn);
        true
    }

    /// Close the turn without touching the reply.
    pub fn terminate(&mut self, turn: TurnId) {
        if turn != self.turn || self.open.is_none() {
            return;
        }
        self.open = None;
        self.phase = TurnPhase::Terminated;
        tracing::info!(turn, "turn terminated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Sender;
    use pretty_assertions::assert_eq;

    fn content(s: &str) -> StreamEvent {
        StreamEvent::Content(s.to_string())
    }

    fn sources(ids: &[&str]) -> StreamEvent {
        StreamEvent::Sources(
            ids.iter()
                .map(|id| Source {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn test_start_turn_appends_user_and_open_bot() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("");

        assert_eq!(turn, 1);
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].sender, Sender::User);
        assert_eq!(conversation.messages()[0].text, "");
        assert_eq!(conversation.messages()[1].sender, Sender::Bot);
        assert_eq!(conversation.phase(), TurnPhase::Sending);
        assert!(conversation.is_open());
    }

    #[test]
    fn test_deltas_concatenate_in_order() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("hi");
        for delta in ["The ", "answer ", "is ", "42."] {
            conversation.apply(turn, content(delta));
        }

        let reply = conversation.open_message().unwrap();
        assert_eq!(reply.text, "The answer is 42.");
        assert_eq!(reply.raw, reply.text);
    }

    #[test]
    fn test_sources_and_content_interleave() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("q");

        let applied = conversation.apply(turn, sources(&["s1", "s2"]));
        assert_eq!(applied, Some(Applied::Sources(Some(SourceRef { message: 1, source: 0 }))));
        assert_eq!(
            conversation.phase(),
            TurnPhase::Streaming {
                content: false,
                sources: true
            }
        );

        conversation.apply(turn, content("text"));
        assert_eq!(
            conversation.phase(),
            TurnPhase::Streaming {
                content: true,
                sources: true
            }
        );
        assert_eq!(conversation.messages()[1].sources.len(), 2);
        assert_eq!(conversation.messages()[1].text, "text");
    }

    #[test]
    fn test_empty_source_list_selects_nothing() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("q");
        assert_eq!(conversation.apply(turn, sources(&[])), Some(Applied::Sources(None)));
    }

    #[test]
    fn test_done_terminates_and_blocks_further_events() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("q");
        conversation.apply(turn, content("a"));

        assert_eq!(conversation.apply(turn, StreamEvent::Done), Some(Applied::Terminated));
        assert_eq!(conversation.phase(), TurnPhase::Terminated);
        assert_eq!(conversation.apply(turn, content("b")), None);
        assert_eq!(conversation.messages()[1].text, "a");
    }

    #[test]
    fn test_failure_replaces_partial_reply() {
        let mut conversation = Conversation::new();
        let turn = conversation.start_turn("q");
        conversation.apply(turn, content("partial"));

        assert!(conversation.fail(turn));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[1].text, FALLBACK_REPLY);
        assert!(!conversation.is_open());
    }

    #[test]
    fn test_stale_turn_events_are_ignored() {
        let mut conversation = Conversation::new();
        let first = conversation.start_turn("one");
        conversation.apply(first, content("first reply"));
        let second = conversation.start_turn("two");

        assert_eq!(conversation.apply(first, content("late")), None);
        assert!(!conversation.fail(first));
        conversation.apply(second, content("second reply"));

        assert_eq!(conversation.messages()[1].text, "first reply");
        assert_eq!(conversation.messages()[3].text, "second reply");
    }

    #[test]
    fn test_accumulator_resets_between_turns() {
        let mut conversation = Conversation::new();
        let first = conversation.start_turn("one");
        conversation.apply(first, content("abc"));
        conversation.terminate(first);

        let second = conversation.start_turn("two");
        conversation.apply(second, content("x"));
        assert_eq!(conversation.messages()[3].text, "x");
    }
}
