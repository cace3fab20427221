use ragchat_core::citations::{self, NumberedSource};
use ragchat_core::{AttachmentContext, PageGeometry, Sender};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, FocusPane, InputMode, PreviewStatus};

/// Ensure the selected item in a list is visible by adjusting the ListState offset.
fn ensure_selected_visible(state: &mut ListState, visible_height: usize) {
    let visible_height = visible_height.max(1);

    if let Some(selected) = state.selected() {
        // Valid offsets put the selected item anywhere from the bottom to the top row
        let min_offset = selected.saturating_sub(visible_height - 1);
        let max_offset = selected;

        let new_offset = state.offset().clamp(min_offset, max_offset);
        if new_offset != state.offset() {
            *state.offset_mut() = new_offset;
        }
    }
}

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing ** (or nothing between), treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
                if found_close {
                    current_text.push_str("**");
                }
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

fn source_title(entry: &NumberedSource<'_>) -> String {
    let title = entry
        .source
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(&entry.source.doc_id);
    format!("[{}] {} (p. {})", entry.number, title, entry.source.page_label)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let show_side = app.chat.citations.panel_visible
        || app.focus != FocusPane::Chat
        || !app.chat.documents.is_empty()
        || app.chat.ingest_status.is_some();

    if show_side {
        let [chat_area, side_area] = Layout::horizontal([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_chat(app, frame, chat_area);
        render_side_panel(app, frame, side_area);
    } else {
        app.sources_area = None;
        render_chat(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    if app.path_prompt.is_some() {
        render_path_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" RAG Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  "),
        Span::styled(
            app.client.session().token().to_string(),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &str, label: &str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    if app.path_prompt.is_some() {
        hints.extend(hint("Enter", "add"));
        hints.extend(hint("Esc", "cancel"));
    } else if app.input_mode == InputMode::Editing {
        hints.extend(hint("Enter", "send"));
        hints.extend(hint("Esc", "normal"));
    } else {
        match app.focus {
            FocusPane::Chat => {
                hints.extend(hint("i", "ask"));
                hints.extend(hint("a", "attach"));
                hints.extend(hint("1-3", "drop"));
                hints.extend(hint("j/k", "scroll"));
            }
            FocusPane::Sources => {
                hints.extend(hint("j/k", "nav"));
                hints.extend(hint("Enter", "preview"));
                hints.extend(hint("+/-/0", "zoom"));
            }
            FocusPane::Documents => {
                hints.extend(hint("u", "add"));
                hints.extend(hint("d", "remove"));
                hints.extend(hint("U", "upload"));
            }
        }
        if app.chat.loading {
            hints.extend(hint("Esc", "abort"));
        }
        hints.extend(hint("Tab", "focus"));
        hints.extend(hint("q", "quit"));
    }

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    spans.extend(hints);
    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!("  {}", status),
            Style::default().bg(Color::Black).fg(Color::Yellow),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// Transcript lines for the whole log, with source badges under bot replies.
fn transcript(app: &App) -> Text<'static> {
    let messages = app.chat.conversation.messages();
    if messages.is_empty() {
        return Text::from(Span::styled(
            "Ask a question about your documents...",
            Style::default().fg(Color::DarkGray),
        ));
    }

    let numbers = citations::inline_numbers(messages);
    let active = app
        .chat
        .citations
        .active
        .and_then(|at| citations::number_of(messages, at));
    let open = app.chat.conversation.open_index();

    let mut lines: Vec<Line> = Vec::new();
    for (i, (msg, badges)) in messages.iter().zip(&numbers).enumerate() {
        match msg.sender {
            Sender::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.text.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Sender::Bot => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                if open == Some(i) && app.chat.loading && msg.text.is_empty() {
                    // Animated ellipsis: cycles through ".", "..", "..."
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        format!("Thinking{}", dots),
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                }
                for line in msg.text.lines() {
                    lines.push(parse_markdown_line(line));
                }
            }
        }

        if !badges.is_empty() {
            let mut spans = Vec::new();
            for number in badges {
                let style = if active == Some(*number) {
                    Style::default().bg(Color::Magenta).fg(Color::White).bold()
                } else {
                    Style::default().fg(Color::Magenta)
                };
                spans.push(Span::styled(format!("[Source {}]", number), style));
                spans.push(Span::raw(" "));
            }
            lines.push(Line::from(spans));
        }
        lines.push(Line::default());
    }

    Text::from(lines)
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let attachments_height = if app.chat.attachments.is_empty() { 0 } else { 1 };
    let [chat_area, attachments_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(attachments_height),
        Constraint::Length(3),
    ])
    .areas(area);

    app.chat_area = Some(chat_area);
    // Inner size minus borders, for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let border_color = if app.focus == FocusPane::Chat {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chat [{}] ", app.client.protocol().as_str()));

    let chat = Paragraph::new(transcript(app))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    if let Some(files) = app.chat.attachments.files() {
        let mut spans = vec![Span::styled(" Attached: ", Style::default().fg(Color::DarkGray))];
        for (i, file) in files.iter().enumerate() {
            spans.push(Span::styled(
                format!("{}:{} ({}) ", i + 1, file.name, format_size(file.size)),
                Style::default().fg(Color::Green),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), attachments_area);
    }

    render_input(app, frame, input_area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let title = if app.chat.loading { " Waiting for reply... " } else { " Ask " };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .chat
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, area);

    if editing && app.path_prompt.is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_side_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let preview_height = if app.preview.is_some() {
        Constraint::Percentage(55)
    } else {
        Constraint::Length(0)
    };
    let [sources_area, preview_area, documents_area] = Layout::vertical([
        Constraint::Min(4),
        preview_height,
        Constraint::Length(7),
    ])
    .areas(area);

    render_sources(app, frame, sources_area);
    if app.preview.is_some() {
        render_preview(app, frame, preview_area);
    }
    render_documents(app, frame, documents_area);
}

fn render_sources(app: &mut App, frame: &mut Frame, area: Rect) {
    app.sources_area = Some(area);

    let border_color = if app.focus == FocusPane::Sources {
        Color::Cyan
    } else {
        Color::Magenta
    };
    let entries = citations::flattened(app.chat.conversation.messages());
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Sources ({}) ", entries.len()));

    if entries.is_empty() {
        let placeholder = Paragraph::new("No sources yet.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let active = app.chat.citations.active;
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| {
            let style = if Some(entry.at) == active {
                Style::default().fg(Color::Yellow).bold()
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(source_title(entry), style)))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Magenta)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let visible_height = area.height.saturating_sub(2) as usize;
    ensure_selected_visible(&mut app.sources_state, visible_height);
    frame.render_stateful_widget(list, area, &mut app.sources_state);
}

fn render_preview(app: &mut App, frame: &mut Frame, area: Rect) {
    let messages = app.chat.conversation.messages();
    let Some(preview) = app.preview.as_mut() else {
        return;
    };
    let Some(source) = preview.at.resolve(messages) else {
        return;
    };

    let number = citations::number_of(messages, preview.at).unwrap_or(0);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(
            " Source {} - page {} - {}% ",
            number,
            source.page_label,
            preview.zoom.percent()
        ));

    let [page_area, text_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(4)]).areas(area);

    match &preview.status {
        PreviewStatus::Loading => {
            let loading = Paragraph::new("Loading page...")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(loading, page_area);
        }
        PreviewStatus::Failed(message) => {
            let failed = Paragraph::new(message.as_str())
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: true })
                .block(block);
            frame.render_widget(failed, page_area);
        }
        PreviewStatus::Ready(page) => {
            let scale = preview.zoom.scale();
            let geometry = PageGeometry::at_scale(*page, scale);
            preview
                .projector
                .render(&mut preview.overlay, &geometry, &source.bboxes, scale);
            let block = block.title_bottom(format!(
                " {} highlighted ",
                preview.overlay.rects().len()
            ));
            frame.render_widget(preview.overlay.canvas(*page, block), page_area);
        }
    }

    let snippet = Paragraph::new(source.content.as_str())
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true });
    frame.render_widget(snippet, text_area);
}

fn render_documents(app: &mut App, frame: &mut Frame, area: Rect) {
    let border_color = if app.focus == FocusPane::Documents {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let title = if app.chat.ingest_loading {
        " Documents (uploading...) ".to_string()
    } else {
        format!(" Documents ({}) ", app.chat.documents.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [list_area, status_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(1)]).areas(inner);

    let items: Vec<ListItem> = app
        .chat
        .documents
        .files()
        .unwrap_or_default()
        .iter()
        .map(|file| ListItem::new(format!("{} ({})", file.name, format_size(file.size))))
        .collect();

    if items.is_empty() {
        frame.render_widget(
            Paragraph::new("Press u to add PDF/DOCX/TXT/MD files.")
                .style(Style::default().fg(Color::DarkGray)),
            list_area,
        );
    } else {
        let list = List::new(items)
            .highlight_style(Style::default().bg(Color::Blue).fg(Color::White))
            .highlight_symbol("> ");
        ensure_selected_visible(&mut app.documents_state, list_area.height as usize);
        frame.render_stateful_widget(list, list_area, &mut app.documents_state);
    }

    if let Some(status) = &app.chat.ingest_status {
        frame.render_widget(
            Paragraph::new(status.as_str()).style(Style::default().fg(Color::Green)),
            status_area,
        );
    }
}

fn render_path_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let Some(prompt) = &app.path_prompt else {
        return;
    };

    let (title, instructions) = match prompt.context {
        AttachmentContext::Chat => (" Attach Files ", "CSV/XLS/XLSX paths, separated by spaces. Up to 3 files."),
        AttachmentContext::Ingest => (" Add Documents ", "PDF/DOCX/TXT/MD paths, separated by spaces."),
    };

    // Centered popup
    let popup_width = 70.min(area.width.saturating_sub(4));
    let popup_height = 6;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(instructions).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let width = input_area.width as usize;
    let offset = prompt.cursor.saturating_sub(width.saturating_sub(1));
    let visible: String = prompt.input.chars().skip(offset).take(width).collect();
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = (prompt.cursor - offset) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_markdown() {
        let line = parse_markdown_line("a **b** c");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "b");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "a **b");
    }

    #[test]
    fn test_empty_bold_keeps_both_markers() {
        let line = parse_markdown_line("x **** y");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "x **** y");
    }

    #[test]
    fn test_text_after_bold_is_plain() {
        let line = parse_markdown_line("**a** then **b");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, vec!["a", " then **b"]);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_selected_item_stays_visible() {
        let mut state = ListState::default();
        state.select(Some(10));
        ensure_selected_visible(&mut state, 4);
        assert_eq!(state.offset(), 7);
    }
}
