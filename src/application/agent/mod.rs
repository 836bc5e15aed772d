//! Conversation loop against the model backend.
//!
//! One [`Agent::run_turn`] call drives a full user turn: it submits the
//! message history, executes any tool calls the model requests, feeds the
//! results back, and repeats until the model answers without tool calls or
//! the round limit trips.


use crate::application::catalog::{CatalogError, ToolDispatcher};
use crate::domain::types::Message;
use crate::infrastructure::model::{ChatRequest, ModelError, ModelProvider};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Seed message every conversation starts from.
pub const SYSTEM_PROMPT: &str = "You are a helpful Assistant!";

/// Upper bound on model/tool round trips within one turn. A model that keeps
/// requesting tools past this point fails the turn instead of looping forever.
pub const MAX_TOOL_ROUNDS: usize = 10;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tool(#[from] CatalogError),
    #[error("conversation exceeded {limit} tool rounds without a final answer")]
    ToolRoundsExhausted { limit: usize },
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    pub think: bool,
    pub options: Option<Map<String, Value>>,
    /// Full history including the newly appended user message.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// History extended with every assistant and tool message of the turn.
    pub messages: Vec<Message>,
    /// The assistant message that ended the turn.
    pub reply: Message,
    pub eval_count: u64,
    pub total_duration: Duration,
    pub tool_rounds: usize,
}

pub struct Agent<P: ModelProvider> {
    provider: Arc<P>,
    dispatcher: Arc<dyn ToolDispatcher>,
}

impl<P: ModelProvider> Agent<P> {
    pub fn new(provider: Arc<P>, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            provider,
            dispatcher,
        }
    }

    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome, AgentError> {
        info!(model = request.model.as_str(), "conversation turn started");
        let TurnRequest {
            model,
            think,
            options,
            mut messages,
        } = request;
        let tools = self.dispatcher.specs();

        for round in 0..MAX_TOOL_ROUNDS {
            debug!(round, messages = messages.len(), "submitting chat request");
            let outcome = self
                .provider
                .chat(ChatRequest {
                    model: model.clone(),
                    think,
                    messages: messages.clone(),
                    tools: tools.clone(),
                    options: options.clone(),
                })
                .await?;

            let reply = outcome.message;
            if reply.tool_calls.is_empty() {
                info!(tool_rounds = round, "turn finished");
                messages.push(reply.clone());
                return Ok(TurnOutcome {
                    messages,
                    reply,
                    eval_count: outcome.eval_count,
                    total_duration: outcome.total_duration,
                    tool_rounds: round,
                });
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                info!(tool = %call.function.name, "model requested tool call");
                let arguments = Value::Object(call.function.arguments.clone());
                let result = self
                    .dispatcher
                    .dispatch(&call.function.name, arguments)
                    .await?;
                messages.push(Message::tool(&call.function.name, result));
            }
        }

        warn!(
            limit = MAX_TOOL_ROUNDS,
            "tool round limit reached without a final answer"
        );
        Err(AgentError::ToolRoundsExhausted {
            limit: MAX_TOOL_ROUNDS,
        })
    }
}
