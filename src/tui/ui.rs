//! Session rendering.

use super::state::{EntryKind, SessionState};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

pub const SPINNER: [&str; 4] = ["⠋", "⠙", "⠹", "⠸"];

pub struct SessionUi;

impl SessionUi {
    pub fn render(frame: &mut Frame, state: &SessionState) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // status bar
                Constraint::Min(5),    // transcript
                Constraint::Length(3), // input
                Constraint::Length(1), // help bar
            ])
            .split(area);

        Self::render_status_bar(frame, chunks[0], state);
        Self::render_transcript(frame, chunks[1], state);
        Self::render_input(frame, chunks[2], state);
        Self::render_help_bar(frame, chunks[3], state);
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &SessionState) {
        let model_display = state.model.as_deref().unwrap_or("no model");

        let spinner = if state.waiting {
            Span::styled(
                format!(" {} ", SPINNER[state.spinner_frame]),
                Style::default().fg(Color::Yellow),
            )
        } else {
            Span::raw("")
        };

        let status_line = Line::from(vec![
            Span::styled(" astrolabe ", Style::default().fg(Color::Cyan)),
            Span::styled("│ ", Style::default().fg(Color::DarkGray)),
            Span::styled(model_display, Style::default().fg(Color::Magenta)),
            Span::styled(" │ ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                format!("{} tools", state.tool_count),
                Style::default().fg(Color::White),
            ),
            spinner,
        ]);

        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray));

        frame.render_widget(Paragraph::new(status_line).block(block), area);
    }

    fn render_transcript(frame: &mut Frame, area: Rect, state: &SessionState) {
        let inner_height = area.height.saturating_sub(2) as usize;

        let mut lines: Vec<Line> = Vec::new();
        for entry in &state.transcript {
            let (prefix, style) = match entry.kind {
                EntryKind::User => (
                    "You: ",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                EntryKind::Assistant => ("AI: ", Style::default().fg(Color::Green)),
                EntryKind::Info => (
                    "",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::ITALIC),
                ),
                EntryKind::Success => ("✓ ", Style::default().fg(Color::Green)),
                EntryKind::Error => ("✗ ", Style::default().fg(Color::Red)),
            };

            let content_lines: Vec<&str> = entry.text.lines().collect();
            if let Some(first_line) = content_lines.first() {
                lines.push(Line::from(vec![
                    Span::styled(prefix, style),
                    Span::styled(*first_line, style),
                ]));
            }
            for line in content_lines.iter().skip(1) {
                let indent = " ".repeat(prefix.len());
                lines.push(Line::from(Span::styled(
                    format!("{indent}{line}"),
                    style,
                )));
            }
            lines.push(Line::from(""));
        }

        if state.waiting {
            lines.push(Line::from(Span::styled(
                format!("AI: {} Thinking...", SPINNER[state.spinner_frame]),
                Style::default().fg(Color::Yellow),
            )));
        }

        let total_lines = lines.len();
        let max_scroll = total_lines.saturating_sub(inner_height);
        let scroll = if state.scroll_offset == u16::MAX {
            max_scroll as u16
        } else {
            state.scroll_offset.min(max_scroll as u16)
        };

        let block = Block::default()
            .borders(Borders::LEFT | Borders::RIGHT)
            .border_style(Style::default().fg(Color::DarkGray));

        let para = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0));

        frame.render_widget(para, area);
    }

    fn render_input(frame: &mut Frame, area: Rect, state: &SessionState) {
        let display_input = if state.input.is_empty() {
            if state.waiting {
                "Waiting for the model...".to_string()
            } else {
                "Type your message...".to_string()
            }
        } else {
            let mut chars: Vec<char> = state.input.chars().collect();
            if state.cursor_pos >= chars.len() {
                chars.push('_');
            } else {
                chars.insert(state.cursor_pos, '|');
            }
            chars.into_iter().collect()
        };

        let input_style = if state.input.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::White)
        };

        let input_line = Line::from(vec![
            Span::styled(
                "> ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(display_input, input_style),
        ]);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(if state.waiting {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Cyan)
            })
            .title(if state.is_command() {
                " Command "
            } else {
                " Message "
            });

        frame.render_widget(Paragraph::new(input_line).block(block), area);
    }

    fn render_help_bar(frame: &mut Frame, area: Rect, state: &SessionState) {
        let help_text = if state.waiting {
            Line::from(Span::styled(
                " Waiting for the model... input is queued until the turn ends ",
                Style::default().fg(Color::Yellow),
            ))
        } else {
            Line::from(vec![
                Span::styled(" Enter", Style::default().fg(Color::Green)),
                Span::raw(": Send │ "),
                Span::styled("/help", Style::default().fg(Color::Green)),
                Span::raw(": Commands │ "),
                Span::styled("PageUp/Down", Style::default().fg(Color::Green)),
                Span::raw(": Scroll │ "),
                Span::styled("Esc", Style::default().fg(Color::Red)),
                Span::raw(": Quit "),
            ])
        };

        frame.render_widget(Paragraph::new(help_text), area);
    }
}
