use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry in the conversation sent to and received from the backend.
///
/// The sequence invariant: exactly one leading system message, user and
/// assistant messages alternating around tool exchanges, and a tool message
/// only ever following the assistant message that issued the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            thinking: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Result message for one completed tool call.
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            thinking: None,
            tool_name: Some(tool_name.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A model-issued request to invoke one tool. Only ever produced by the
/// backend, never constructed from user input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// Structured parameter schema advertised by a tool server for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn default_schema_type() -> String {
    "object".to_string()
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    /// Builds a schema from a server-advertised `inputSchema` value, falling
    /// back to an empty object schema for tools that advertise none.
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = value else {
            return Self::default();
        };
        Self {
            schema_type: map
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("object")
                .to_string(),
            properties: map
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            required: map
                .get("required")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// One tool as advertised by its owning server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: ParameterSchema,
}

/// Backend wire form of one tool, wrapped the way the chat API expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub spec_type: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: ParameterSchema,
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            spec_type: "function".to_string(),
            function: ToolFunction {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.schema.clone(),
            },
        }
    }
}

/// How one tool server is reached. Exactly one variant per definition, so a
/// server can never be both a subprocess and a network endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServerTransport {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Http {
        endpoint: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

impl ServerTransport {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerTransport::Stdio { .. } => "stdio",
            ServerTransport::Http { .. } => "http",
        }
    }

    /// One-line summary for listings.
    pub fn describe(&self) -> String {
        match self {
            ServerTransport::Stdio { command, args, .. } => {
                if args.is_empty() {
                    format!("stdio: {command}")
                } else {
                    format!("stdio: {command} {}", args.join(" "))
                }
            }
            ServerTransport::Http { endpoint, .. } => format!("http: {endpoint}"),
        }
    }
}

/// One configured tool server plus the tool list captured by the last
/// successful catalog build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerDefinition {
    pub name: String,
    pub transport: ServerTransport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
}

impl ToolServerDefinition {
    pub fn new(name: impl Into<String>, transport: ServerTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            tools: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serialization_omits_empty_fields() {
        let message = Message::user("hello");
        let value = serde_json::to_value(&message).expect("serializes");
        assert_eq!(value, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn tool_message_carries_tool_name() {
        let message = Message::tool("fetch", "result body");
        let value = serde_json::to_value(&message).expect("serializes");
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_name"], "fetch");
    }

    #[test]
    fn parses_tool_calls_from_backend_payload() {
        let payload = json!({
            "role": "assistant",
            "content": "",
            "tool_calls": [
                {"function": {"name": "web_search", "arguments": {"query": "rust"}}}
            ]
        });
        let message: Message = serde_json::from_value(payload).expect("deserializes");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].function.name, "web_search");
        assert_eq!(
            message.tool_calls[0].function.arguments["query"],
            json!("rust")
        );
    }

    #[test]
    fn schema_from_advertised_input_schema() {
        let advertised = json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        });
        let schema = ParameterSchema::from_value(Some(&advertised));
        assert_eq!(schema.schema_type, "object");
        assert!(schema.properties.contains_key("query"));
        assert_eq!(schema.required, vec!["query".to_string()]);
    }

    #[test]
    fn schema_defaults_when_absent() {
        let schema = ParameterSchema::from_value(None);
        assert_eq!(schema.schema_type, "object");
        assert!(schema.properties.is_empty());
        assert!(schema.required.is_empty());
    }

    #[test]
    fn transport_serializes_with_kind_tag() {
        let transport = ServerTransport::Stdio {
            command: "uvx".into(),
            args: vec!["mcp-server-time".into()],
            env: BTreeMap::new(),
        };
        let value = serde_json::to_value(&transport).expect("serializes");
        assert_eq!(value["kind"], "stdio");
        assert_eq!(value["command"], "uvx");

        let parsed: ServerTransport = serde_json::from_value(json!({
            "kind": "http",
            "endpoint": "https://example.com/mcp",
            "headers": {"Authorization": "Bearer token"}
        }))
        .expect("deserializes");
        match parsed {
            ServerTransport::Http { endpoint, headers } => {
                assert_eq!(endpoint, "https://example.com/mcp");
                assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer token"));
            }
            other => panic!("expected http transport, got {other:?}"),
        }
    }

    #[test]
    fn tool_spec_wraps_descriptor_as_function() {
        let descriptor = ToolDescriptor {
            name: "fetch".into(),
            description: "Fetch a URL".into(),
            schema: ParameterSchema::default(),
        };
        let spec = ToolSpec::from(&descriptor);
        assert_eq!(spec.spec_type, "function");
        assert_eq!(spec.function.name, "fetch");
        let value = serde_json::to_value(&spec).expect("serializes");
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["parameters"]["type"], "object");
    }
}
