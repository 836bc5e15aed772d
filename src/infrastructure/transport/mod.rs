//! Transport connector: live MCP sessions to configured tool servers.
//!
//! Two wire bindings of the same logical interface: a spawned subprocess
//! speaking newline-framed JSON-RPC over its stdio, and a streamable HTTP
//! endpoint speaking JSON-RPC over POST with SSE-framed responses.

mod http;
mod rpc;
mod stdio;

pub use http::HttpTransport;
pub use rpc::CallOutcome;
pub use stdio::StdioTransport;

use crate::domain::types::{ServerTransport, ToolDescriptor, ToolServerDefinition};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn tool server '{server}': {source}")]
    Spawn {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tool server '{server}' is unreachable: {source}")]
    Connect {
        server: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("tool server '{server}' transport error: {message}")]
    Channel { server: String, message: String },

    #[error("tool server '{server}' sent a malformed payload: {message}")]
    Malformed { server: String, message: String },

    #[error("tool server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("tool server '{server}' terminated unexpectedly")]
    Terminated { server: String },
}

/// One live session against a tool server.
///
/// Sessions are single-use: opened, queried, closed. `close` must be called
/// before dropping so subprocess children are reaped and network sessions are
/// released; the stdio variant additionally kills its child on drop as a
/// backstop.
#[async_trait]
pub trait ToolTransport: Send {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, TransportError>;

    async fn call_tool(
        &mut self,
        tool: &str,
        arguments: Value,
    ) -> Result<CallOutcome, TransportError>;

    async fn close(&mut self);
}

/// Opens a session for one definition, running the MCP handshake.
pub async fn connect(
    definition: &ToolServerDefinition,
) -> Result<Box<dyn ToolTransport>, TransportError> {
    match &definition.transport {
        ServerTransport::Stdio { command, args, env } => {
            let transport = StdioTransport::connect(&definition.name, command, args, env).await?;
            Ok(Box::new(transport))
        }
        ServerTransport::Http { endpoint, headers } => {
            let transport = HttpTransport::connect(&definition.name, endpoint, headers).await?;
            Ok(Box::new(transport))
        }
    }
}
