//! Ollama-compatible backend client.

use crate::domain::types::{Message, ToolSpec};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub think: bool,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: Message,
    pub eval_count: u64,
    pub total_duration: Duration,
}

/// One installed model as reported by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    #[serde(rename = "model")]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ModelInfo {
    pub fn size_display(&self) -> String {
        let bytes = self.size as f64;
        if bytes >= 1e9 {
            format!("{:.1} GB", bytes / 1e9)
        } else {
            format!("{:.0} MB", bytes / 1e6)
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model backend returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Cannot reach the model backend. Check that Ollama is running and the base URL is correct.".to_string()
                } else if err.is_timeout() {
                    "The model backend took too long to answer. Try again in a moment.".to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::NOT_FOUND => {
                            "The backend does not expose /api/chat (404). Check the base URL."
                                .to_string()
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            "The model backend is temporarily unavailable. Try again later."
                                .to_string()
                        }
                        _ => format!(
                            "The model backend answered with status {}. Try again later.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while talking to the model backend.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The model backend sent a response that could not be processed.".to_string()
            }
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ModelError>;
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError>;
}

#[derive(Clone)]
pub struct OllamaBackend {
    http: Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ModelProvider for OllamaBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ModelError> {
        let url = self.endpoint("/api/chat");
        let payload = ChatPayload::from(&request);
        info!(
            model = request.model.as_str(),
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending chat request"
        );
        let reply: ChatReply = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("received chat response");
        outcome_from_reply(reply)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ModelError> {
        let url = self.endpoint("/api/tags");
        debug!(url = %url, "listing installed models");
        let reply: TagsReply = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply.models)
    }
}

fn outcome_from_reply(reply: ChatReply) -> Result<ChatOutcome, ModelError> {
    if !reply.done {
        return Err(ModelError::InvalidResponse(
            "streaming reply to a non-streaming request".into(),
        ));
    }
    let message = reply
        .message
        .ok_or_else(|| ModelError::InvalidResponse("missing message field".into()))?;
    Ok(ChatOutcome {
        message,
        eval_count: reply.eval_count,
        total_duration: Duration::from_nanos(reply.total_duration),
    })
}

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    think: bool,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSpec],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a Map<String, Value>>,
}

impl<'a> From<&'a ChatRequest> for ChatPayload<'a> {
    fn from(value: &'a ChatRequest) -> Self {
        Self {
            model: &value.model,
            messages: &value.messages,
            stream: false,
            think: value.think,
            tools: &value.tools,
            options: value.options.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: Option<Message>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_paths_correctly() {
        let backend = OllamaBackend::new("http://localhost:11434/");
        assert_eq!(
            backend.endpoint("/api/chat"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn payload_omits_empty_tool_list() {
        let request = ChatRequest {
            model: "qwen3:8b".into(),
            think: true,
            messages: vec![Message::user("hi")],
            tools: Vec::new(),
            options: None,
        };
        let value = serde_json::to_value(ChatPayload::from(&request)).expect("serialize");
        assert!(value.get("tools").is_none());
        assert!(value.get("options").is_none());
        assert_eq!(value["stream"], false);
        assert_eq!(value["think"], true);
    }

    #[test]
    fn unfinished_reply_is_rejected() {
        let reply: ChatReply =
            serde_json::from_value(serde_json::json!({"message": {"role": "assistant", "content": "par"}, "done": false}))
                .expect("parse");
        assert!(matches!(
            outcome_from_reply(reply),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn finished_reply_carries_metrics() {
        let reply: ChatReply = serde_json::from_value(serde_json::json!({
            "message": {"role": "assistant", "content": "hello"},
            "done": true,
            "eval_count": 42,
            "total_duration": 2_000_000_000u64
        }))
        .expect("parse");
        let outcome = outcome_from_reply(reply).expect("outcome");
        assert_eq!(outcome.eval_count, 42);
        assert_eq!(outcome.total_duration, Duration::from_secs(2));
        assert_eq!(outcome.message.content, "hello");
    }

    #[test]
    fn tags_reply_reads_model_field() {
        let reply: TagsReply = serde_json::from_value(serde_json::json!({
            "models": [
                {"name": "qwen3:8b", "model": "qwen3:8b", "size": 5_200_000_000u64,
                 "modified_at": "2025-06-01T10:00:00Z"}
            ]
        }))
        .expect("parse");
        assert_eq!(reply.models.len(), 1);
        assert_eq!(reply.models[0].name, "qwen3:8b");
        assert_eq!(reply.models[0].size_display(), "5.2 GB");
    }
}
