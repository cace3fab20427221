//! Turn controller: the conversation log plus the composer, ingest and
//! citation state a front end renders from.

use crate::attachments::{Attachment, AttachmentContext, AttachmentSet};
use crate::citations::SourceRef;
use crate::conversation::{Applied, Conversation, TurnId};
use crate::state::Source;
use crate::stream::StreamEvent;

pub const INGEST_FAILED: &str = "Upload failed. Check the server and try again.";

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Transport closed or the terminator arrived
    Completed,
    Failed(String),
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdateKind {
    Event(StreamEvent),
    Finished(TurnOutcome),
}

/// Message from a network task to the state owner.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnUpdate {
    pub turn: TurnId,
    pub kind: TurnUpdateKind,
}

impl TurnUpdate {
    pub fn event(turn: TurnId, event: StreamEvent) -> Self {
        Self {
            turn,
            kind: TurnUpdateKind::Event(event),
        }
    }

    pub fn finished(turn: TurnId, outcome: TurnOutcome) -> Self {
        Self {
            turn,
            kind: TurnUpdateKind::Finished(outcome),
        }
    }
}

/// Everything the network task needs to send a turn.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub turn: TurnId,
    pub question: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CitationSelection {
    pub active: Option<SourceRef>,
    pub panel_visible: bool,
    pub preview_open: bool,
}

pub struct ChatState {
    pub conversation: Conversation,

    // Composer
    pub input: String,
    pub attachments: AttachmentSet,
    pub loading: bool,

    // Bulk ingest
    pub documents: AttachmentSet,
    pub ingest_loading: bool,
    pub ingest_status: Option<String>,

    pub citations: CitationSelection,

    /// Last file-rejection notice, shown once by the front end
    pub notice: Option<String>,
    scroll_requested: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            input: String::new(),
            attachments: AttachmentSet::new(AttachmentContext::Chat),
            loading: false,
            documents: AttachmentSet::new(AttachmentContext::Ingest),
            ingest_loading: false,
            ingest_status: None,
            citations: CitationSelection::default(),
            notice: None,
            scroll_requested: false,
        }
    }

    pub fn can_send(&self) -> bool {
        !self.loading && (!self.input.trim().is_empty() || !self.attachments.is_empty())
    }

    /// Open a turn from the current composer contents.
    pub fn begin_turn(&mut self) -> Option<PendingTurn> {
        if !self.can_send() {
            return None;
        }

        let question = self.input.clone();
        let turn = self.conversation.start_turn(&question);
        self.loading = true;
        self.scroll_requested = true;

        Some(PendingTurn {
            turn,
            question,
            attachments: self.attachments.files().map(<[Attachment]>::to_vec).unwrap_or_default(),
        })
    }

    pub fn apply_update(&mut self, update: TurnUpdate) {
        match update.kind {
            TurnUpdateKind::Event(event) => self.apply_event(update.turn, event),
            TurnUpdateKind::Finished(outcome) => self.finish_turn(update.turn, outcome),
        }
    }

    fn apply_event(&mut self, turn: TurnId, event: StreamEvent) {
        match self.conversation.apply(turn, event) {
            Some(Applied::Content) => self.scroll_requested = true,
            Some(Applied::Sources(Some(first))) => {
                self.citations.active = Some(first);
                self.citations.panel_visible = true;
            }
            Some(Applied::Sources(None)) | Some(Applied::Terminated) | None => {}
        }
    }

    /// Close a turn. The cleanup runs for every outcome of the current turn.
    pub fn finish_turn(&mut self, turn: TurnId, outcome: TurnOutcome) {
        if turn != self.conversation.current_turn() {
            return;
        }

        match outcome {
            TurnOutcome::Completed => self.conversation.terminate(turn),
            TurnOutcome::Failed(_) | TurnOutcome::Aborted => {
                self.conversation.fail(turn);
            }
        }

        self.loading = false;
        self.input.clear();
        self.attachments.clear();
        self.scroll_requested = true;
    }

    /// The front end consumes this once per frame.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_requested)
    }

    pub fn add_attachments(&mut self, raw: Vec<Attachment>) {
        let rejected = self.attachments.add(raw);
        self.note_rejections(AttachmentContext::Chat, rejected);
    }

    pub fn add_documents(&mut self, raw: Vec<Attachment>) {
        let rejected = self.documents.add(raw);
        self.note_rejections(AttachmentContext::Ingest, rejected);
    }

    fn note_rejections(&mut self, context: AttachmentContext, rejected: usize) {
        if rejected > 0 {
            self.notice = Some(context.rejection_notice(rejected));
        }
    }

    /// Documents to upload, or `None` when nothing is pending or an upload
    /// is already running.
    pub fn begin_ingest(&mut self) -> Option<Vec<Attachment>> {
        if self.ingest_loading {
            return None;
        }
        let documents = self.documents.files()?.to_vec();
        self.ingest_loading = true;
        self.ingest_status = None;
        Some(documents)
    }

    pub fn finish_ingest<E: std::fmt::Display>(&mut self, result: Result<String, E>) {
        self.ingest_status = Some(match result {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(%err, "document upload failed");
                INGEST_FAILED.to_string()
            }
        });
        self.documents.clear();
        self.ingest_loading = false;
    }

    pub fn select_source(&mut self, at: SourceRef) {
        if at.resolve(self.conversation.messages()).is_some() {
            self.citations.active = Some(at);
            self.citations.panel_visible = true;
        }
    }

    pub fn active_source(&self) -> Option<&Source> {
        self.citations.active?.resolve(self.conversation.messages())
    }
}
