//! Aggregated tool catalog across all configured servers.
//!
//! Building the catalog connects to every server once, lists its tools, and
//! indexes them by lowercased name. Any server that fails to answer fails the
//! whole build. Tool invocation opens a fresh connection for the one call and
//! closes it afterwards.

use crate::domain::types::{ToolDescriptor, ToolServerDefinition, ToolSpec};
use crate::infrastructure::transport::{self, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no tool named '{name}' is available")]
    UnknownTool { name: String },
    #[error("tool '{tool}' on server '{server}' failed: {detail}")]
    Execution {
        server: String,
        tool: String,
        detail: String,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Seam between the conversation loop and the actual tool servers.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;
    async fn dispatch(&self, tool: &str, arguments: Value) -> Result<String, CatalogError>;
}

struct CatalogEntry {
    server_index: usize,
    descriptor: ToolDescriptor,
}

pub struct ToolCatalog {
    definitions: Vec<ToolServerDefinition>,
    index: HashMap<String, CatalogEntry>,
    order: Vec<String>,
}

impl ToolCatalog {
    /// Connects to each definition in turn, refreshing its tool list. The
    /// returned catalog owns the refreshed definitions so callers can persist
    /// them after a successful build.
    pub async fn build(definitions: &[ToolServerDefinition]) -> Result<Self, CatalogError> {
        let mut refreshed = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let mut link = transport::connect(definition).await?;
            let listed = match link.list_tools().await {
                Ok(listed) => listed,
                Err(err) => {
                    link.close().await;
                    return Err(err.into());
                }
            };
            link.close().await;
            info!(
                server = %definition.name,
                tools = listed.len(),
                "discovered tools"
            );
            let mut updated = definition.clone();
            updated.tools = listed;
            refreshed.push(updated);
        }
        Ok(Self::assemble(refreshed))
    }

    /// Indexes the tools already present on the definitions. On a name clash
    /// the first registration wins and later ones are logged and ignored.
    fn assemble(definitions: Vec<ToolServerDefinition>) -> Self {
        let mut index: HashMap<String, CatalogEntry> = HashMap::new();
        let mut order = Vec::new();
        for (server_index, definition) in definitions.iter().enumerate() {
            for descriptor in &definition.tools {
                let key = descriptor.name.to_lowercase();
                match index.entry(key.clone()) {
                    Entry::Occupied(existing) => {
                        let holder = &definitions[existing.get().server_index].name;
                        warn!(
                            tool = %descriptor.name,
                            server = %definition.name,
                            shadowed_by = %holder,
                            "duplicate tool name, keeping first registration"
                        );
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(CatalogEntry {
                            server_index,
                            descriptor: descriptor.clone(),
                        });
                        order.push(key);
                    }
                }
            }
        }
        Self {
            definitions,
            index,
            order,
        }
    }

    pub fn definitions(&self) -> &[ToolServerDefinition] {
        &self.definitions
    }

    pub fn into_definitions(self) -> Vec<ToolServerDefinition> {
        self.definitions
    }

    pub fn server_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn tool_count(&self) -> usize {
        self.index.len()
    }

    pub fn resolve(&self, tool: &str) -> Option<(&str, &ToolDescriptor)> {
        let entry = self.index.get(&tool.to_lowercase())?;
        Some((
            self.definitions[entry.server_index].name.as_str(),
            &entry.descriptor,
        ))
    }

    pub async fn invoke(&self, tool: &str, arguments: Value) -> Result<String, CatalogError> {
        let entry = self
            .index
            .get(&tool.to_lowercase())
            .ok_or_else(|| CatalogError::UnknownTool {
                name: tool.to_string(),
            })?;
        let definition = &self.definitions[entry.server_index];
        info!(
            tool = %entry.descriptor.name,
            server = %definition.name,
            "invoking tool"
        );

        let mut link = transport::connect(definition).await?;
        let outcome = match link.call_tool(&entry.descriptor.name, arguments).await {
            Ok(outcome) => outcome,
            Err(err) => {
                link.close().await;
                return Err(err.into());
            }
        };
        link.close().await;

        if outcome.is_error {
            let detail = if outcome.text.is_empty() {
                "tool execution failed".to_string()
            } else {
                outcome.text
            };
            return Err(CatalogError::Execution {
                server: definition.name.clone(),
                tool: entry.descriptor.name.clone(),
                detail,
            });
        }
        Ok(outcome.text)
    }
}

#[async_trait]
impl ToolDispatcher for ToolCatalog {
    fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|key| self.index.get(key))
            .map(|entry| ToolSpec::from(&entry.descriptor))
            .collect()
    }

    async fn dispatch(&self, tool: &str, arguments: Value) -> Result<String, CatalogError> {
        self.invoke(tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ServerTransport;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn definition_with_tools(name: &str, tools: &[&str]) -> ToolServerDefinition {
        let mut definition = ToolServerDefinition::new(
            name,
            ServerTransport::Stdio {
                command: "echo".into(),
                args: Vec::new(),
                env: BTreeMap::new(),
            },
        );
        definition.tools = tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.to_string(),
                description: format!("{tool} tool"),
                schema: Default::default(),
            })
            .collect();
        definition
    }

    #[test]
    fn first_registration_wins_on_name_clash() {
        let catalog = ToolCatalog::assemble(vec![
            definition_with_tools("alpha", &["read_file", "write_file"]),
            definition_with_tools("beta", &["Read_File", "search"]),
        ]);
        assert_eq!(catalog.tool_count(), 3);
        let (server, descriptor) = catalog.resolve("read_file").expect("resolved");
        assert_eq!(server, "alpha");
        assert_eq!(descriptor.name, "read_file");
    }

    #[test]
    fn resolution_ignores_caller_case() {
        let catalog = ToolCatalog::assemble(vec![definition_with_tools("alpha", &["Get_Weather"])]);
        let (server, descriptor) = catalog.resolve("get_weather").expect("resolved");
        assert_eq!(server, "alpha");
        assert_eq!(descriptor.name, "Get_Weather");
    }

    #[test]
    fn specs_follow_first_seen_order() {
        let catalog = ToolCatalog::assemble(vec![
            definition_with_tools("alpha", &["b_tool", "a_tool"]),
            definition_with_tools("beta", &["c_tool"]),
        ]);
        let names: Vec<_> = catalog
            .specs()
            .into_iter()
            .map(|spec| spec.function.name)
            .collect();
        assert_eq!(names, vec!["b_tool", "a_tool", "c_tool"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_before_any_connection() {
        let catalog = ToolCatalog::assemble(vec![definition_with_tools("alpha", &["search"])]);
        let err = catalog
            .invoke("missing", json!({}))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, CatalogError::UnknownTool { name } if name == "missing"));
    }
}
