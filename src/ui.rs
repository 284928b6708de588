use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, InputMode};
use crate::provider::Provider;
use crate::session::TurnRole;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
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

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    frame.render_widget(
        Block::default().style(Style::default().bg(app.theme.bg())),
        area,
    );

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Popups, in order of priority
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let key_hint = match app.key_source(app.current_provider) {
        Some(source) => format!(" [key: {source}]"),
        None => " [no key]".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(
            " gemchat ",
            Style::default().fg(app.theme.accent()).bold(),
        ),
        Span::styled(
            format!("{} · {}", app.current_provider.display_name(), app.selected_model),
            Style::default().fg(app.theme.fg()),
        ),
        Span::styled(key_hint, Style::default().fg(app.theme.dim())),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(app.theme.dim()),
        ),
    ]);

    frame.render_widget(Paragraph::new(title), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.dim()))
        .title(" Conversation ");
    let inner = block.inner(area);

    // Remember the viewport so scroll math matches what is on screen
    app.chat_height = inner.height;
    app.chat_width = inner.width;

    let mut lines: Vec<Line> = Vec::new();

    if app.session.turns.is_empty() && !app.session.is_busy() {
        lines.push(Line::from(Span::styled(
            "Type a message and press Enter to start.",
            Style::default().fg(app.theme.dim()),
        )));
    }

    for turn in &app.session.turns {
        let (label, style) = match turn.role {
            TurnRole::User => ("You:", Style::default().fg(app.theme.accent()).bold()),
            TurnRole::Assistant => ("AI:", Style::default().green().bold()),
            TurnRole::Error => ("Error:", Style::default().red().bold()),
        };
        lines.push(Line::from(Span::styled(label, style)));
        for text_line in turn.text.lines() {
            match turn.role {
                TurnRole::Assistant => lines.push(parse_markdown_line(text_line)),
                _ => lines.push(Line::from(Span::styled(
                    text_line.to_string(),
                    Style::default().fg(app.theme.fg()),
                ))),
            }
        }
        lines.push(Line::default());
    }

    if app.session.is_busy() {
        let dots = ".".repeat((app.animation_frame + 1) as usize);
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().green().bold(),
        )));
        lines.push(Line::from(Span::styled(
            format!("Thinking{dots}"),
            Style::default().fg(app.theme.dim()).italic(),
        )));
    }

    let chat = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_style = if app.input_mode == InputMode::Editing {
        Style::default().fg(app.theme.accent())
    } else {
        Style::default().fg(app.theme.dim())
    };

    let title = if app.session.is_busy() {
        " Message (waiting for reply) "
    } else {
        " Message "
    };

    let input = Paragraph::new(app.session.draft.as_str())
        .style(Style::default().fg(app.theme.fg()))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(title),
        );

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.session.is_busy() {
        frame.set_cursor_position((input_cursor_x(area, app.cursor), area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = match app.input_mode {
        InputMode::Editing => "Enter send · Esc browse · Ctrl-C quit",
        InputMode::Normal => {
            "i type · j/k scroll · g/G top/bottom · t theme · M models · P provider · q quit"
        }
    };

    frame.render_widget(
        Paragraph::new(Span::styled(hints, Style::default().fg(app.theme.dim()))),
        area,
    );
}

/// Cursor column inside a bordered box, clamped before any u16 cast so a
/// pathologically long input cannot overflow.
fn input_cursor_x(area: Rect, cursor: usize) -> u16 {
    let max_offset = area.width.saturating_sub(2) as usize;
    area.x + 1 + cursor.min(max_offset) as u16
}

/// Centered popup rect with the given width/height caps
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(44, Provider::all().len() as u16 + 2, area);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = Provider::all()
        .iter()
        .map(|p| {
            let marker = match app.key_source(*p) {
                Some(source) => format!("{} ({source})", p.display_name()),
                None => format!("{} (needs key)", p.display_name()),
            };
            ListItem::new(marker)
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent()))
                .title(" Provider "),
        )
        .highlight_style(Style::default().fg(app.theme.accent()).bold())
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup, &mut app.provider_picker_state);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let height = (app.available_models.len() as u16 + 2).min(12);
    let popup = centered_rect(44, height, area);
    frame.render_widget(Clear, popup);

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|m| ListItem::new(m.as_str()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent()))
                .title(" Model "),
        )
        .highlight_style(Style::default().fg(app.theme.accent()).bold())
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup, &mut app.model_picker_state);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(52, 3, area);
    frame.render_widget(Clear, popup);

    // Mask the key; only its length is shown
    let masked = "*".repeat(app.api_key_input.chars().count());

    let input = Paragraph::new(masked).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(app.theme.accent()))
            .title(" Gemini API key (Enter to save, Esc to cancel) "),
    );

    frame.render_widget(input, popup);
    frame.set_cursor_position((input_cursor_x(popup, app.api_key_input_cursor), popup.y + 1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markers_become_styled_spans() {
        let line = parse_markdown_line("a **bold** word");
        assert_eq!(line.spans.len(), 3);
        assert!(line.spans[1]
            .style
            .add_modifier
            .contains(Modifier::BOLD));
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("just **dangling");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "just **dangling");
    }

    #[test]
    fn cursor_stays_inside_the_box_for_long_input() {
        let area = Rect::new(10, 0, 40, 3);
        assert_eq!(input_cursor_x(area, 0), 11);
        assert_eq!(input_cursor_x(area, 5), 16);
        // A draft far wider than the box pins the cursor at the right edge
        assert_eq!(input_cursor_x(area, 100_000), 10 + 1 + 38);
        // Cursor offsets beyond u16 must not overflow the cast
        assert_eq!(input_cursor_x(area, usize::MAX), 10 + 1 + 38);
    }

    #[test]
    fn centered_rect_fits_inside_area() {
        let area = Rect::new(0, 0, 80, 24);
        let popup = centered_rect(44, 3, area);
        assert!(popup.x + popup.width <= 80);
        assert!(popup.y + popup.height <= 24);
    }
}
