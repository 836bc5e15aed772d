//! Interactive session state.

use crate::application::agent::SYSTEM_PROMPT;
use crate::domain::types::Message;
use crate::infrastructure::model::ModelInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    User,
    Assistant,
    Info,
    Success,
    Error,
}

/// One displayed transcript line group. Local notices live here without ever
/// entering the conversation sent to the backend.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub kind: EntryKind,
    pub text: String,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Assistant,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Error,
            text: text.into(),
        }
    }
}

pub struct SessionState {
    /// Active model, if one has been chosen.
    pub model: Option<String>,
    /// Models the backend reported at startup, cached for /models and /model.
    pub models: Vec<ModelInfo>,
    /// Conversation as sent to the backend. Starts with the system message.
    pub messages: Vec<Message>,
    /// What the user sees, including local notices.
    pub transcript: Vec<TranscriptEntry>,
    pub input: String,
    pub cursor_pos: usize,
    pub scroll_offset: u16,
    /// A turn is in flight; new submissions are rejected until it lands.
    pub waiting: bool,
    pub spinner_frame: usize,
    pub tool_count: usize,
}

impl SessionState {
    pub fn new(model: Option<String>) -> Self {
        Self {
            model,
            models: Vec::new(),
            messages: vec![Message::system(SYSTEM_PROMPT)],
            transcript: Vec::new(),
            input: String::new(),
            cursor_pos: 0,
            scroll_offset: u16::MAX,
            waiting: false,
            spinner_frame: 0,
            tool_count: 0,
        }
    }

    pub fn push_entry(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
        self.scroll_to_bottom();
    }

    /// Resets the conversation to just the system message. The transcript is
    /// cleared too.
    pub fn clear_conversation(&mut self) {
        self.messages = vec![Message::system(SYSTEM_PROMPT)];
        self.transcript.clear();
        self.scroll_offset = 0;
    }

    pub fn take_input(&mut self) -> String {
        self.cursor_pos = 0;
        std::mem::take(&mut self.input)
    }

    pub fn insert_char(&mut self, c: char) {
        if self.cursor_pos >= self.input.len() {
            self.input.push(c);
        } else {
            self.input.insert(self.cursor_pos, c);
        }
        self.cursor_pos += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor_pos > 0 && !self.input.is_empty() {
            self.input.remove(self.cursor_pos - 1);
            self.cursor_pos -= 1;
        }
    }

    pub fn delete_char_forward(&mut self) {
        if self.cursor_pos < self.input.len() {
            self.input.remove(self.cursor_pos);
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        if self.cursor_pos < self.input.len() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_cursor_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.cursor_pos = self.input.len();
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(1);
    }

    /// Actual clamping happens during render based on content height.
    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = u16::MAX;
    }

    pub fn tick(&mut self) {
        if self.waiting {
            self.spinner_frame = (self.spinner_frame + 1) % 4;
        }
    }

    pub fn is_command(&self) -> bool {
        self.input.starts_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Role;

    #[test]
    fn conversation_starts_with_the_system_message() {
        let state = SessionState::new(Some("qwen3:8b".into()));
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::System);
    }

    #[test]
    fn clear_keeps_only_the_system_message() {
        let mut state = SessionState::new(None);
        state.messages.push(Message::user("hello"));
        state.messages.push(Message::assistant("hi"));
        state.push_entry(TranscriptEntry::user("hello"));

        state.clear_conversation();

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::System);
        assert!(state.transcript.is_empty());
    }

    #[test]
    fn cursor_editing_stays_in_bounds() {
        let mut state = SessionState::new(None);
        state.insert_char('h');
        state.insert_char('i');
        state.move_cursor_left();
        state.insert_char('e');
        assert_eq!(state.input, "hei");
        state.delete_char();
        assert_eq!(state.input, "hi");
        state.move_cursor_home();
        state.delete_char();
        assert_eq!(state.input, "hi");
        state.delete_char_forward();
        assert_eq!(state.input, "i");
    }

    #[test]
    fn take_input_resets_the_buffer() {
        let mut state = SessionState::new(None);
        state.insert_char('x');
        assert_eq!(state.take_input(), "x");
        assert!(state.input.is_empty());
        assert_eq!(state.cursor_pos, 0);
    }

    #[test]
    fn spinner_only_advances_while_waiting() {
        let mut state = SessionState::new(None);
        state.tick();
        assert_eq!(state.spinner_frame, 0);
        state.waiting = true;
        state.tick();
        assert_eq!(state.spinner_frame, 1);
    }
}
