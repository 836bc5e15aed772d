//! Streamable HTTP transport: JSON-RPC over POST with SSE response framing.
//!
//! Every request is a POST to the configured endpoint. The server answers
//! either with a plain JSON body or with a `text/event-stream` whose `data:`
//! events carry JSON-RPC messages; the response matching the request id is
//! extracted from the stream. A server-assigned `Mcp-Session-Id` is echoed on
//! every subsequent request and released with a DELETE on close.

use super::rpc;
use super::{CallOutcome, TransportError};
use crate::domain::types::ToolDescriptor;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Applies caller-supplied headers to each outbound request as it is built,
/// instead of baking them into the HTTP client's own default-header handling.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    headers: Vec<(String, String)>,
}

impl HeaderInterceptor {
    pub fn new(headers: &BTreeMap<String, String>) -> Self {
        Self {
            headers: headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }
}

pub struct HttpTransport {
    server: String,
    endpoint: String,
    http: reqwest::Client,
    interceptor: HeaderInterceptor,
    session_id: Option<String>,
}

impl HttpTransport {
    pub async fn connect(
        server: &str,
        endpoint: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut transport = Self {
            server: server.to_string(),
            endpoint: endpoint.to_string(),
            http: reqwest::Client::new(),
            interceptor: HeaderInterceptor::new(headers),
            session_id: None,
        };
        debug!(server = %server, endpoint = %endpoint, "opening http session");
        transport.handshake().await?;
        Ok(transport)
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        self.send_request("initialize", rpc::initialize_params())
            .await?;
        let note = rpc::notification("notifications/initialized", json!({}));
        self.post(&note).await?;
        Ok(())
    }

    async fn send_request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = Uuid::new_v4().to_string();
        let payload = rpc::request(&id, method, params);
        let response = self.post(&payload).await?;
        let message = self.read_message(response, &id).await?;
        if let Some(error) = message.get("error") {
            let (code, text) = rpc::error_parts(error);
            return Err(TransportError::Rpc {
                server: self.server.clone(),
                code,
                message: text,
            });
        }
        Ok(message.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn post(&mut self, payload: &Value) -> Result<reqwest::Response, TransportError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(header::ACCEPT, ACCEPT_BOTH)
            .json(payload);
        request = self.interceptor.apply(request);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                server: self.server.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Channel {
                server: self.server.clone(),
                message: format!("endpoint returned HTTP {status}"),
            });
        }

        if self.session_id.is_none() {
            if let Some(session) = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|value| value.to_str().ok())
            {
                debug!(server = %self.server, session_id = session, "server assigned session");
                self.session_id = Some(session.to_string());
            }
        }
        Ok(response)
    }

    /// Reads the JSON-RPC message answering request `id`, from either a plain
    /// JSON body or an SSE stream.
    async fn read_message(
        &self,
        response: reqwest::Response,
        id: &str,
    ) -> Result<Value, TransportError> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.starts_with("text/event-stream") {
            return response
                .json::<Value>()
                .await
                .map_err(|source| TransportError::Malformed {
                    server: self.server.clone(),
                    message: format!("invalid JSON body: {source}"),
                });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| TransportError::Channel {
                server: self.server.clone(),
                message: format!("event stream failed: {source}"),
            })?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some((frame_end, consumed)) = frame_boundary(&buffer) {
                let frame = buffer[..frame_end].to_string();
                buffer.drain(..consumed);
                let Some(data) = frame_data(&frame) else {
                    continue;
                };
                let value: Value = match serde_json::from_str(&data) {
                    Ok(value) => value,
                    Err(source) => {
                        warn!(server = %self.server, %source, "event stream carried invalid JSON");
                        continue;
                    }
                };
                if is_response_for(&value, id) {
                    return Ok(value);
                }
                debug!(server = %self.server, "skipping interleaved server message");
            }
        }

        Err(TransportError::Terminated {
            server: self.server.clone(),
        })
    }
}

#[async_trait]
impl super::ToolTransport for HttpTransport {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let result = self.send_request("tools/list", json!({})).await?;
        Ok(rpc::tools_from_list(&result))
    }

    async fn call_tool(
        &mut self,
        tool: &str,
        arguments: Value,
    ) -> Result<CallOutcome, TransportError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let result = self
            .send_request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await?;
        Ok(rpc::call_outcome(&result))
    }

    async fn close(&mut self) {
        let Some(session) = self.session_id.take() else {
            return;
        };
        let request = self
            .interceptor
            .apply(self.http.delete(&self.endpoint))
            .header(SESSION_HEADER, &session);
        if let Err(err) = request.send().await {
            debug!(server = %self.server, %err, "failed to release http session");
        }
    }
}

/// Finds the next SSE frame boundary (blank line), handling both LF and CRLF
/// framing. Returns (frame end, bytes to consume).
fn frame_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(l), Some(c)) if c < l => Some((c, c + 4)),
        (Some(l), _) => Some((l, l + 2)),
        (None, Some(c)) => Some((c, c + 4)),
        (None, None) => None,
    }
}

/// Joins the `data:` lines of one SSE frame, or None for comment/heartbeat
/// frames.
fn frame_data(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn is_response_for(value: &Value, id: &str) -> bool {
    if value.get("method").is_some() {
        return false;
    }
    value
        .get("id")
        .and_then(rpc::id_key)
        .is_some_and(|key| key == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lf_framed_events() {
        let buffer = "data: {\"a\":1}\n\ndata: {\"b\":2}\n\n";
        let (end, consumed) = frame_boundary(buffer).expect("boundary");
        assert_eq!(&buffer[..end], "data: {\"a\":1}");
        assert_eq!(consumed, end + 2);
    }

    #[test]
    fn splits_crlf_framed_events() {
        let buffer = "data: {\"a\":1}\r\n\r\nrest";
        let (end, consumed) = frame_boundary(buffer).expect("boundary");
        assert_eq!(&buffer[..end], "data: {\"a\":1}");
        assert_eq!(consumed, end + 4);
    }

    #[test]
    fn no_boundary_in_partial_frame() {
        assert!(frame_boundary("data: {\"a\":").is_none());
    }

    #[test]
    fn joins_multi_line_data_fields() {
        let frame = "event: message\ndata: {\"a\":\ndata: 1}";
        assert_eq!(frame_data(frame), Some("{\"a\":\n1}".to_string()));
    }

    #[test]
    fn heartbeat_frames_carry_no_data() {
        assert_eq!(frame_data(": keep-alive"), None);
    }

    #[test]
    fn matches_response_by_id_only() {
        let id = "abc";
        assert!(is_response_for(&json!({"id": "abc", "result": {}}), id));
        assert!(!is_response_for(&json!({"id": "other", "result": {}}), id));
        assert!(!is_response_for(
            &json!({"id": "abc", "method": "ping"}),
            id
        ));
        assert!(!is_response_for(&json!({"result": {}}), id));
    }
}
