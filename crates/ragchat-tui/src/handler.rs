use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ragchat_core::AttachmentContext;
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line editing shared by the composer and the path prompt.
/// Returns false for keys it does not handle.
fn edit_line(text: &mut String, cursor: &mut usize, code: KeyCode) -> bool {
    match code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(text.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = text.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            if app.chat.loading {
                app.tick_animation();
            }
        }
        AppEvent::FilesLoaded {
            context,
            files,
            failures,
        } => app.apply_loaded_files(context, files, failures),
        AppEvent::Ingested(result) => app.finish_upload(result),
        AppEvent::PageLoaded { at, result } => app.apply_page(at, result),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.path_prompt.is_some() {
        handle_path_prompt(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_path_prompt(app: &mut App, key: KeyEvent) {
    let Some(prompt) = app.path_prompt.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => app.path_prompt = None,
        KeyCode::Enter => app.submit_path_prompt(),
        code => {
            edit_line(&mut prompt.input, &mut prompt.cursor, code);
        }
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::Char('i') => {
            app.focus = FocusPane::Chat;
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.chat.input.chars().count();
        }
        KeyCode::Esc => {
            if !app.abort() && app.preview.is_some() {
                app.close_preview();
            }
        }
        KeyCode::Char('a') => app.open_path_prompt(AttachmentContext::Chat),
        KeyCode::Char('u') => {
            app.focus = FocusPane::Documents;
            app.open_path_prompt(AttachmentContext::Ingest);
        }
        KeyCode::Char('U') => app.upload_documents(),
        KeyCode::Char('s') => {
            let citations = &mut app.chat.citations;
            citations.panel_visible = !citations.panel_visible;
        }
        KeyCode::Char(c @ '1'..='3') if app.focus == FocusPane::Chat => {
            let index = (c as usize) - ('1' as usize);
            if index < app.chat.attachments.len() {
                app.chat.attachments.remove(index);
            }
        }
        _ => match app.focus {
            FocusPane::Chat => handle_chat_normal(app, key),
            FocusPane::Sources => handle_sources_normal(app, key),
            FocusPane::Documents => handle_documents_normal(app, key),
        },
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.chat.input.chars().count();
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        _ => {}
    }
}

fn handle_sources_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.sources_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.sources_nav_up(),
        KeyCode::Enter => app.open_selected_source(),
        KeyCode::Char('+') | KeyCode::Char('=') => {
            if let Some(preview) = app.preview.as_mut() {
                preview.zoom.zoom_in();
            }
        }
        KeyCode::Char('-') => {
            if let Some(preview) = app.preview.as_mut() {
                preview.zoom.zoom_out();
            }
        }
        KeyCode::Char('0') => {
            if let Some(preview) = app.preview.as_mut() {
                preview.zoom.reset();
            }
        }
        _ => {}
    }
}

fn handle_documents_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.documents_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.documents_nav_up(),
        KeyCode::Char('d') | KeyCode::Delete => app.remove_selected_document(),
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => app.send(),
        code => {
            edit_line(&mut app.chat.input, &mut app.input_cursor, code);
        }
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    // Position-based scrolling
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_sources = app.sources_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_add(3);
            } else if in_sources {
                app.sources_nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.chat_scroll = app.chat_scroll.saturating_sub(3);
            } else if in_sources {
                app.sources_nav_up();
            }
        }
        _ => {}
    }
}
