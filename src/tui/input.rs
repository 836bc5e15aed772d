//! Keyboard handling for the chat session.

use super::state::SessionState;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// Send the current input as a user message.
    Submit,
    Exit,
    /// Run a slash command locally.
    Command(String),
    ScrollUp,
    ScrollDown,
    ScrollTop,
    ScrollBottom,
}

/// Parsed form of a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Help,
    Clear,
    Models,
    Model(Option<String>),
    Unknown(String),
}

/// Turns one terminal event into an action. Editing keys always update the
/// input buffer, even mid-turn; only submission is gated on `waiting`.
pub fn handle_input(state: &mut SessionState, event: Event) -> InputAction {
    match event {
        Event::Key(key) => handle_key(state, key),
        _ => InputAction::None,
    }
}

fn handle_key(state: &mut SessionState, key: KeyEvent) -> InputAction {
    if key.kind != KeyEventKind::Press {
        return InputAction::None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return InputAction::Exit;
    }

    match key.code {
        KeyCode::Enter => {
            if state.waiting || state.input.trim().is_empty() {
                return InputAction::None;
            }
            if state.is_command() {
                return InputAction::Command(state.take_input());
            }
            if is_exit_keyword(state.input.trim()) {
                return InputAction::Exit;
            }
            InputAction::Submit
        }
        KeyCode::Esc => InputAction::Exit,
        KeyCode::Backspace => {
            state.delete_char();
            InputAction::None
        }
        KeyCode::Delete => {
            state.delete_char_forward();
            InputAction::None
        }
        KeyCode::Left => {
            state.move_cursor_left();
            InputAction::None
        }
        KeyCode::Right => {
            state.move_cursor_right();
            InputAction::None
        }
        KeyCode::Home => {
            state.move_cursor_home();
            InputAction::None
        }
        KeyCode::End => {
            state.move_cursor_end();
            InputAction::None
        }
        KeyCode::Up | KeyCode::PageUp => InputAction::ScrollUp,
        KeyCode::Down | KeyCode::PageDown => InputAction::ScrollDown,
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            InputAction::ScrollTop
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            InputAction::ScrollBottom
        }
        KeyCode::Char(c) => {
            state.insert_char(c);
            InputAction::None
        }
        KeyCode::Tab => {
            state.insert_char(' ');
            state.insert_char(' ');
            InputAction::None
        }
        _ => InputAction::None,
    }
}

fn is_exit_keyword(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

pub fn parse_command(input: &str) -> SessionCommand {
    let body = input.trim_start_matches('/');
    let mut parts = body.split_whitespace();
    let name = parts.next().unwrap_or("").to_ascii_lowercase();

    match name.as_str() {
        "help" => SessionCommand::Help,
        "clear" => SessionCommand::Clear,
        "models" => SessionCommand::Models,
        "model" => SessionCommand::Model(parts.next().map(str::to_string)),
        other => SessionCommand::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn enter_submits_plain_text() {
        let mut state = SessionState::new(Some("m".into()));
        state.input = "hello".into();
        assert_eq!(handle_input(&mut state, press(KeyCode::Enter)), InputAction::Submit);
    }

    #[test]
    fn enter_is_a_noop_on_blank_input() {
        let mut state = SessionState::new(Some("m".into()));
        state.input = "   ".into();
        assert_eq!(handle_input(&mut state, press(KeyCode::Enter)), InputAction::None);
    }

    #[test]
    fn waiting_blocks_submission_but_not_editing() {
        let mut state = SessionState::new(Some("m".into()));
        state.waiting = true;
        state.input = "queued".into();
        state.cursor_pos = state.input.len();

        assert_eq!(handle_input(&mut state, press(KeyCode::Enter)), InputAction::None);
        assert_eq!(
            handle_input(&mut state, press(KeyCode::Char('!'))),
            InputAction::None
        );
        assert_eq!(state.input, "queued!");
    }

    #[test]
    fn slash_input_becomes_a_command_action() {
        let mut state = SessionState::new(Some("m".into()));
        state.input = "/models".into();
        assert_eq!(
            handle_input(&mut state, press(KeyCode::Enter)),
            InputAction::Command("/models".into())
        );
        assert!(state.input.is_empty());
    }

    #[test]
    fn exit_keywords_close_the_session() {
        for keyword in ["exit", "quit", "EXIT"] {
            let mut state = SessionState::new(Some("m".into()));
            state.input = keyword.into();
            assert_eq!(handle_input(&mut state, press(KeyCode::Enter)), InputAction::Exit);
        }
    }

    #[test]
    fn interrupt_closes_the_session_even_while_waiting() {
        let mut state = SessionState::new(Some("m".into()));
        state.waiting = true;
        let event = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(handle_input(&mut state, event), InputAction::Exit);
    }

    #[test]
    fn parses_the_session_commands() {
        assert_eq!(parse_command("/help"), SessionCommand::Help);
        assert_eq!(parse_command("/clear"), SessionCommand::Clear);
        assert_eq!(parse_command("/models"), SessionCommand::Models);
        assert_eq!(
            parse_command("/model qwen3:8b"),
            SessionCommand::Model(Some("qwen3:8b".into()))
        );
        assert_eq!(parse_command("/model"), SessionCommand::Model(None));
        assert_eq!(
            parse_command("/bogus now"),
            SessionCommand::Unknown("bogus".into())
        );
    }
}
