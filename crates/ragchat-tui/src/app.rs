use std::path::PathBuf;

use ragchat_core::citations;
use ragchat_core::{
    Attachment, AttachmentContext, ChatState, HighlightProjector, PageSize, RagClient, SourceRef, TurnUpdate,
    Zoom,
};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::preview::CanvasOverlay;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    Sources,
    Documents,
}

impl FocusPane {
    pub fn next(self) -> Self {
        match self {
            FocusPane::Chat => FocusPane::Sources,
            FocusPane::Sources => FocusPane::Documents,
            FocusPane::Documents => FocusPane::Chat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewStatus {
    Loading,
    Ready(PageSize),
    Failed(String),
}

/// Page preview for the selected citation.
pub struct PagePreview {
    pub at: SourceRef,
    pub status: PreviewStatus,
    pub zoom: Zoom,
    pub projector: HighlightProjector,
    pub overlay: CanvasOverlay,
}

/// Single-line path entry popup.
pub struct PathPrompt {
    pub context: AttachmentContext,
    pub input: String,
    pub cursor: usize,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    pub chat: ChatState,
    pub input_cursor: usize, // cursor position in chat.input
    pub client: RagClient,
    pub cancel: Option<CancellationToken>,

    // Transcript viewport
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    pub sources_state: ListState,
    pub documents_state: ListState,
    pub preview: Option<PagePreview>,
    pub path_prompt: Option<PathPrompt>,

    /// One-line message in the footer
    pub status: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub sources_area: Option<Rect>,

    pub turn_tx: UnboundedSender<TurnUpdate>,
    pub events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        client: RagClient,
        turn_tx: UnboundedSender<TurnUpdate>,
        events_tx: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Chat,

            chat: ChatState::new(),
            input_cursor: 0,
            client,
            cancel: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            sources_state: ListState::default(),
            documents_state: ListState::default(),
            preview: None,
            path_prompt: None,

            status: None,
            animation_frame: 0,

            chat_area: None,
            sources_area: None,

            turn_tx,
            events_tx,
        }
    }

    pub fn tick_animation(&mut self) {
        self.animation_frame = (self.animation_frame + 1) % 3;
    }

    /// Start a turn from the composer and hand it to a background task.
    pub fn send(&mut self) {
        let Some(pending) = self.chat.begin_turn() else {
            return;
        };

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());

        let client = self.client.clone();
        let tx = self.turn_tx.clone();
        tokio::spawn(async move {
            client
                .stream_turn(pending.turn, pending.question, pending.attachments, cancel, tx)
                .await;
        });

        self.input_mode = InputMode::Normal;
        self.scroll_chat_to_bottom();
    }

    /// Abort the running turn; its task reports back like any other outcome.
    pub fn abort(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                self.status = Some("Request aborted".to_string());
                true
            }
            None => false,
        }
    }

    pub fn apply_turn_update(&mut self, update: TurnUpdate) {
        let had_active = self.chat.citations.active;
        self.chat.apply_update(update);

        if !self.chat.loading {
            self.cancel = None;
            self.input_cursor = 0;
        }

        // Follow a newly selected citation in the sources list
        if let Some(active) = self.chat.citations.active {
            if had_active != Some(active) {
                self.sync_sources_selection(active);
            }
        }

        if self.chat.take_scroll_request() {
            self.scroll_chat_to_bottom();
        }
    }

    fn sync_sources_selection(&mut self, active: SourceRef) {
        let index = citations::flattened(self.chat.conversation.messages())
            .iter()
            .position(|entry| entry.at == active);
        self.sources_state.select(index);
    }

    pub fn open_path_prompt(&mut self, context: AttachmentContext) {
        self.path_prompt = Some(PathPrompt {
            context,
            input: String::new(),
            cursor: 0,
        });
    }

    /// Read the typed paths in the background.
    pub fn submit_path_prompt(&mut self) {
        let Some(prompt) = self.path_prompt.take() else {
            return;
        };
        let paths: Vec<PathBuf> = prompt.input.split_whitespace().map(PathBuf::from).collect();
        if paths.is_empty() {
            return;
        }

        let tx = self.events_tx.clone();
        let context = prompt.context;
        tokio::spawn(async move {
            let (files, failures) = load_all(&paths).await;
            let _ = tx.send(AppEvent::FilesLoaded {
                context,
                files,
                failures,
            });
        });
    }

    pub fn apply_loaded_files(
        &mut self,
        context: AttachmentContext,
        files: Vec<Attachment>,
        failures: Vec<String>,
    ) {
        match context {
            AttachmentContext::Chat => self.chat.add_attachments(files),
            AttachmentContext::Ingest => {
                self.chat.add_documents(files);
                if self.documents_state.selected().is_none() && !self.chat.documents.is_empty() {
                    self.documents_state.select(Some(0));
                }
            }
        }

        self.status = if !failures.is_empty() {
            Some(format!("Could not read: {}", failures.join(", ")))
        } else {
            self.chat.notice.take()
        };
    }

    pub fn upload_documents(&mut self) {
        let Some(documents) = self.chat.begin_ingest() else {
            return;
        };

        let client = self.client.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = client.ingest(&documents).await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Ingested(result));
        });
    }

    pub fn finish_upload(&mut self, result: Result<String, String>) {
        self.chat.finish_ingest(result);
        self.documents_state.select(None);
    }

    pub fn remove_selected_document(&mut self) {
        if let Some(i) = self.documents_state.selected() {
            self.chat.documents.remove(i);
            let len = self.chat.documents.len();
            self.documents_state
                .select(if len == 0 { None } else { Some(i.min(len - 1)) });
        }
    }

    // Sources list navigation
    pub fn sources_nav_down(&mut self) {
        let len = citations::flattened(self.chat.conversation.messages()).len();
        if len > 0 {
            let i = self.sources_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.sources_state.select(Some(i));
        }
    }

    pub fn sources_nav_up(&mut self) {
        let i = self.sources_state.selected().unwrap_or(0);
        self.sources_state.select(Some(i.saturating_sub(1)));
    }

    pub fn documents_nav_down(&mut self) {
        let len = self.chat.documents.len();
        if len > 0 {
            let i = self.documents_state.selected().map_or(0, |i| (i + 1).min(len - 1));
            self.documents_state.select(Some(i));
        }
    }

    pub fn documents_nav_up(&mut self) {
        let i = self.documents_state.selected().unwrap_or(0);
        self.documents_state.select(Some(i.saturating_sub(1)));
    }

    /// Select the highlighted citation and fetch its page.
    pub fn open_selected_source(&mut self) {
        let Some(i) = self.sources_state.selected() else {
            return;
        };
        let Some(at) = citations::flattened(self.chat.conversation.messages())
            .get(i)
            .map(|entry| entry.at)
        else {
            return;
        };
        self.chat.select_source(at);
        self.open_preview(at);
    }

    pub fn open_preview(&mut self, at: SourceRef) {
        let Some(source) = at.resolve(self.chat.conversation.messages()).cloned() else {
            return;
        };
        self.chat.citations.preview_open = true;

        let has_boxes = !source.bboxes.is_empty();
        self.preview = Some(PagePreview {
            at,
            status: if has_boxes {
                PreviewStatus::Loading
            } else {
                PreviewStatus::Failed("No PDF preview available for this source".to_string())
            },
            zoom: Zoom::default(),
            projector: HighlightProjector::new(),
            overlay: CanvasOverlay::default(),
        });
        if !has_boxes {
            return;
        }

        let client = self.client.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = client
                .fetch_page(&source.doc_id, &source.page_label)
                .await
                .map(|bytes| PageSize::from_pdf(&bytes))
                .map_err(|_| {
                    "Failed to load PDF page. Document might not exist or backend is unreachable."
                        .to_string()
                });
            let _ = tx.send(AppEvent::PageLoaded { at, result });
        });
    }

    pub fn apply_page(&mut self, at: SourceRef, result: Result<PageSize, String>) {
        // Ignore pages for a preview that has since been replaced
        if let Some(preview) = self.preview.as_mut().filter(|p| p.at == at) {
            preview.status = match result {
                Ok(size) => PreviewStatus::Ready(size),
                Err(message) => PreviewStatus::Failed(message),
            };
            preview.projector.invalidate();
        }
    }

    pub fn close_preview(&mut self) {
        self.preview = None;
        self.chat.citations.preview_open = false;
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        let numbers = citations::inline_numbers(self.chat.conversation.messages());

        for (msg, badges) in self.chat.conversation.messages().iter().zip(&numbers) {
            total_lines += 1; // Sender line ("You:" or "AI:")
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
            if !badges.is_empty() {
                total_lines += 1; // Source badges
            }
            total_lines += 1; // Blank line after message
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }
}

/// Read every path, collecting the ones that could not be read.
async fn load_all(paths: &[PathBuf]) -> (Vec<Attachment>, Vec<String>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();
    for path in paths {
        match Attachment::load(path).await {
            Ok(file) => files.push(file),
            Err(err) => {
                tracing::warn!(%err, "could not read file");
                failures.push(path.display().to_string());
            }
        }
    }
    (files, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::{Endpoints, SessionIdentity, Source, StreamEvent, StreamProtocol};

    fn app() -> App {
        let client = RagClient::with_endpoints(
            Endpoints::new("http://127.0.0.1:9"),
            StreamProtocol::Structured,
            SessionIdentity::with_token("session_0_test"),
        );
        let (turn_tx, _turn_rx) = tokio::sync::mpsc::unbounded_channel();
        let (events_tx, _events_rx) = tokio::sync::mpsc::unbounded_channel();
        App::new(client, turn_tx, events_tx)
    }

    #[test]
    fn test_focus_cycles() {
        assert_eq!(FocusPane::Chat.next(), FocusPane::Sources);
        assert_eq!(FocusPane::Documents.next(), FocusPane::Chat);
    }

    #[test]
    fn test_sources_event_selects_list_entry() {
        let mut app = app();
        app.chat.input = "q".to_string();
        let pending = app.chat.begin_turn().unwrap();

        app.apply_turn_update(TurnUpdate::event(
            pending.turn,
            StreamEvent::Sources(vec![Source {
                id: "s1".to_string(),
                ..Default::default()
            }]),
        ));

        assert_eq!(app.sources_state.selected(), Some(0));
        assert!(app.chat.citations.panel_visible);
    }

    #[test]
    fn test_loaded_files_report_rejections() {
        let mut app = app();
        app.apply_loaded_files(
            AttachmentContext::Chat,
            vec![Attachment::new("a.exe", b"1".to_vec())],
            Vec::new(),
        );
        assert_eq!(
            app.status.as_deref(),
            Some("1 file(s) ignored - only CSV/XLS/XLSX allowed.")
        );
    }

    #[test]
    fn test_remove_selected_document() {
        let mut app = app();
        app.apply_loaded_files(
            AttachmentContext::Ingest,
            vec![
                Attachment::new("a.pdf", b"1".to_vec()),
                Attachment::new("b.pdf", b"1".to_vec()),
            ],
            Vec::new(),
        );
        app.documents_nav_down();
        app.remove_selected_document();

        assert_eq!(app.chat.documents.len(), 1);
        assert_eq!(app.documents_state.selected(), Some(0));
        app.remove_selected_document();
        assert!(app.chat.documents.is_empty());
        assert_eq!(app.documents_state.selected(), None);
    }
}
