//! Session event loop.
//!
//! A single cooperative loop drives rendering and input. Turns run as
//! detached tasks and hand their result back through a channel, so the loop
//! never blocks on the backend and nothing outside it touches session state.

use super::input::{self, InputAction, SessionCommand};
use super::state::{SessionState, TranscriptEntry};
use super::terminal::{Tui, init_terminal, restore_terminal};
use super::ui::SessionUi;
use crate::application::agent::{Agent, AgentError, TurnOutcome, TurnRequest};
use crate::application::catalog::ToolDispatcher;
use crate::config::Settings;
use crate::domain::types::Message;
use crate::infrastructure::model::{ModelInfo, ModelProvider};
use crossterm::event;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

const HELP_TEXT: &str = r#"Available commands:
  /help          - Show this help
  /clear         - Reset the conversation
  /models        - List installed models
  /model <name>  - Switch the active model
Type exit or quit to leave."#;

/// Result of one finished turn, delivered back into the UI loop.
enum TurnEvent {
    Completed(TurnOutcome),
    Failed(String),
}

pub async fn run_session<P>(
    provider: Arc<P>,
    dispatcher: Arc<dyn ToolDispatcher>,
    settings: &Settings,
    models: Vec<ModelInfo>,
) -> io::Result<()>
where
    P: ModelProvider + 'static,
{
    let mut terminal = init_terminal()?;
    let mut state = SessionState::new(settings.default_model.clone());
    state.models = models;
    state.tool_count = dispatcher.specs().len();

    match &state.model {
        Some(model) => state.push_entry(TranscriptEntry::info(format!(
            "Chatting with {model}. Type /help for commands."
        ))),
        None => state.push_entry(TranscriptEntry::info(
            "No default model configured. Use /model <name> to pick one, or /models to list them.",
        )),
    }

    let result = run_loop(&mut terminal, &mut state, provider, dispatcher, settings).await;

    restore_terminal()?;
    result
}

async fn run_loop<P>(
    terminal: &mut Tui,
    state: &mut SessionState,
    provider: Arc<P>,
    dispatcher: Arc<dyn ToolDispatcher>,
    settings: &Settings,
) -> io::Result<()>
where
    P: ModelProvider + 'static,
{
    let (turn_tx, mut turn_rx) = mpsc::channel::<TurnEvent>(10);

    loop {
        terminal.draw(|frame| SessionUi::render(frame, state))?;

        while let Ok(event) = turn_rx.try_recv() {
            match event {
                TurnEvent::Completed(outcome) => {
                    state.waiting = false;
                    state.messages = outcome.messages;
                    state.push_entry(TranscriptEntry::assistant(outcome.reply.content));
                }
                TurnEvent::Failed(reason) => {
                    state.waiting = false;
                    state.push_entry(TranscriptEntry::error(reason));
                }
            }
        }

        let timeout = if state.waiting {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(50)
        };

        if event::poll(timeout)? {
            let event = event::read()?;
            match input::handle_input(state, event) {
                InputAction::Exit => return Ok(()),
                InputAction::Submit => {
                    submit_turn(state, &provider, &dispatcher, settings, &turn_tx);
                }
                InputAction::Command(command) => handle_command(state, &command),
                InputAction::ScrollUp => state.scroll_up(),
                InputAction::ScrollDown => state.scroll_down(),
                InputAction::ScrollTop => state.scroll_offset = 0,
                InputAction::ScrollBottom => state.scroll_to_bottom(),
                InputAction::None => {}
            }
        } else if state.waiting {
            state.tick();
        }
    }
}

fn submit_turn<P>(
    state: &mut SessionState,
    provider: &Arc<P>,
    dispatcher: &Arc<dyn ToolDispatcher>,
    settings: &Settings,
    turn_tx: &mpsc::Sender<TurnEvent>,
) where
    P: ModelProvider + 'static,
{
    let text = state.take_input().trim().to_string();
    if text.is_empty() {
        return;
    }
    let Some(model) = state.model.clone() else {
        state.push_entry(TranscriptEntry::error(
            "No model selected. Use /model <name> to pick one.",
        ));
        return;
    };

    state.messages.push(Message::user(&text));
    state.push_entry(TranscriptEntry::user(text));
    state.waiting = true;

    let request = TurnRequest {
        model,
        think: settings.think,
        options: settings.backend_options(),
        messages: state.messages.clone(),
    };
    let agent = Agent::new(provider.clone(), dispatcher.clone());
    let tx = turn_tx.clone();

    tokio::spawn(async move {
        match agent.run_turn(request).await {
            Ok(outcome) => {
                let _ = tx.send(TurnEvent::Completed(outcome)).await;
            }
            Err(err) => {
                let _ = tx.send(TurnEvent::Failed(turn_error_text(&err))).await;
            }
        }
    });
}

fn turn_error_text(err: &AgentError) -> String {
    match err {
        AgentError::Model(err) => err.user_message(),
        other => other.to_string(),
    }
}

fn handle_command(state: &mut SessionState, command: &str) {
    debug!(command, "handling session command");
    match input::parse_command(command) {
        SessionCommand::Help => state.push_entry(TranscriptEntry::info(HELP_TEXT)),
        SessionCommand::Clear => {
            state.clear_conversation();
            state.push_entry(TranscriptEntry::info("Conversation cleared."));
        }
        SessionCommand::Models => {
            if state.models.is_empty() {
                state.push_entry(TranscriptEntry::info("The backend reported no models."));
            } else {
                let listing: Vec<String> = state
                    .models
                    .iter()
                    .map(|model| format!("  {} ({})", model.name, model.size_display()))
                    .collect();
                state.push_entry(TranscriptEntry::info(format!(
                    "Installed models:\n{}",
                    listing.join("\n")
                )));
            }
        }
        SessionCommand::Model(None) => {
            state.push_entry(TranscriptEntry::info("Usage: /model <name>"));
        }
        SessionCommand::Model(Some(name)) => match state
            .models
            .iter()
            .find(|model| model.name == name)
        {
            Some(info) => {
                state.model = Some(info.name.clone());
                state.push_entry(TranscriptEntry::success(format!(
                    "Switched to model '{}'.",
                    info.name
                )));
            }
            None => {
                state.push_entry(TranscriptEntry::error(format!(
                    "Model '{name}' is not installed. Use /models to list installed models."
                )));
            }
        },
        SessionCommand::Unknown(name) => {
            state.push_entry(TranscriptEntry::error(format!(
                "Unknown command: /{name}. Type /help for available commands."
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::model::ModelInfo;

    fn state_with_models(names: &[&str]) -> SessionState {
        let mut state = SessionState::new(None);
        state.models = names
            .iter()
            .map(|name| ModelInfo {
                name: name.to_string(),
                size: 1_000_000_000,
                modified_at: None,
            })
            .collect();
        state
    }

    #[test]
    fn model_switch_requires_an_installed_model() {
        let mut state = state_with_models(&["qwen3:8b"]);

        handle_command(&mut state, "/model qwen3:8b");
        assert_eq!(state.model.as_deref(), Some("qwen3:8b"));

        handle_command(&mut state, "/model missing");
        assert_eq!(state.model.as_deref(), Some("qwen3:8b"));
        let last = state.transcript.last().expect("entry");
        assert!(last.text.contains("not installed"));
    }

    #[test]
    fn clear_command_resets_the_conversation() {
        let mut state = state_with_models(&[]);
        state.messages.push(Message::user("hi"));
        handle_command(&mut state, "/clear");
        assert_eq!(state.messages.len(), 1);
        let last = state.transcript.last().expect("entry");
        assert_eq!(last.text, "Conversation cleared.");
    }

    #[test]
    fn unknown_command_reports_an_error() {
        let mut state = state_with_models(&[]);
        handle_command(&mut state, "/frobnicate");
        let last = state.transcript.last().expect("entry");
        assert!(last.text.contains("Unknown command: /frobnicate"));
    }
}
