//! JSON-RPC 2.0 plumbing shared by both tool-server transports.
//!
//! Payloads stay as `serde_json::Value` end to end; servers in the wild are
//! too loose with optional fields for rigid structs to be worth it here.

use crate::domain::types::{ParameterSchema, ToolDescriptor};
use serde_json::{Value, json};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Flattened result of one `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub text: String,
    pub is_error: bool,
}

pub fn request(id: &str, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
}

pub fn response(id: Value, result: Value) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "result": result
    });
    if let Value::Object(map) = &mut payload {
        map.insert("id".to_string(), id);
    }
    payload
}

pub fn error_response(id: Value, code: i64, message: String) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message }
    });
    if let Value::Object(map) = &mut payload {
        map.insert("id".to_string(), id);
    }
    payload
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {}
    })
}

/// Pulls `(code, message)` out of a JSON-RPC error member, with defaults for
/// servers that omit either field.
pub fn error_parts(error: &Value) -> (i64, String) {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    (code, message)
}

/// Normalizes a response id into a pending-map key. Servers may echo ids as
/// strings or numbers.
pub fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Maps a `tools/list` result into descriptors, skipping nameless entries.
pub fn tools_from_list(result: &Value) -> Vec<ToolDescriptor> {
    let Some(entries) = result.get("tools").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?;
            Some(ToolDescriptor {
                name: name.to_string(),
                description: entry
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                schema: ParameterSchema::from_value(entry.get("inputSchema")),
            })
        })
        .collect()
}

/// Flattens a `tools/call` result: text content parts joined by newline plus
/// the server's error flag.
pub fn call_outcome(result: &Value) -> CallOutcome {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    CallOutcome { text, is_error }
}
