//! Persistent registry of configured tool servers.
//!
//! The registry never mutates in place: callers derive a candidate definition
//! list with [`ServerRegistry::with_added`] or [`ServerRegistry::with_removed`],
//! prove it usable (by building a catalog from it), and only then [`commit`]
//! the result. A rejected candidate leaves both the in-memory registry and the
//! file on disk untouched.
//!
//! [`commit`]: ServerRegistry::commit

use crate::config::{self, ConfigError};
use crate::domain::types::ToolServerDefinition;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    definitions: Vec<ToolServerDefinition>,
}

impl ServerRegistry {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(&config::registry_path(root))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no server registry yet, starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let definitions =
            serde_json::from_str(&raw).map_err(|source| ConfigError::ParseRegistry {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { definitions })
    }

    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        self.save_to(&config::registry_path(root))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = serde_json::to_string_pretty(&self.definitions)
            .map_err(|source| ConfigError::SerializeRegistry { source })?;
        fs::write(path, raw).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            path = %path.display(),
            servers = self.definitions.len(),
            "saved server registry"
        );
        Ok(())
    }

    pub fn definitions(&self) -> &[ToolServerDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Server names match case-insensitively everywhere they are compared.
    pub fn find(&self, name: &str) -> Option<&ToolServerDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.name.eq_ignore_ascii_case(name))
    }

    /// Candidate definition list with `definition` appended.
    pub fn with_added(
        &self,
        definition: ToolServerDefinition,
    ) -> Result<Vec<ToolServerDefinition>, ConfigError> {
        if self.find(&definition.name).is_some() {
            return Err(ConfigError::DuplicateServer {
                name: definition.name,
            });
        }
        let mut candidate = self.definitions.clone();
        candidate.push(definition);
        Ok(candidate)
    }

    /// Candidate definition list with the named server removed.
    pub fn with_removed(&self, name: &str) -> Result<Vec<ToolServerDefinition>, ConfigError> {
        if self.find(name).is_none() {
            return Err(ConfigError::UnknownServer {
                name: name.to_string(),
            });
        }
        Ok(self
            .definitions
            .iter()
            .filter(|definition| !definition.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    /// Installs a proven definition list and persists it.
    pub fn commit(
        &mut self,
        root: &Path,
        definitions: Vec<ToolServerDefinition>,
    ) -> Result<(), ConfigError> {
        self.definitions = definitions;
        self.save(root)
    }

    pub fn install(&mut self, definitions: Vec<ToolServerDefinition>) {
        self.definitions = definitions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ServerTransport;
    use std::collections::BTreeMap;

    fn stdio_definition(name: &str) -> ToolServerDefinition {
        ToolServerDefinition::new(
            name,
            ServerTransport::Stdio {
                command: "echo".into(),
                args: vec!["hi".into()],
                env: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = ServerRegistry::load_from(&dir.path().join("servers.json")).expect("load");
        assert!(registry.is_empty());
    }

    #[test]
    fn round_trips_definitions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("servers.json");
        let mut registry = ServerRegistry::default();
        registry.install(vec![
            stdio_definition("files"),
            ToolServerDefinition::new(
                "search",
                ServerTransport::Http {
                    endpoint: "https://mcp.example.com/".into(),
                    headers: BTreeMap::from([("Authorization".into(), "Bearer x".into())]),
                },
            ),
        ]);
        registry.save_to(&path).expect("save");

        let reloaded = ServerRegistry::load_from(&path).expect("load");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.definitions()[0].name, "files");
        assert_eq!(reloaded.definitions()[1].transport.kind(), "http");
    }

    #[test]
    fn add_rejects_case_insensitive_duplicate() {
        let mut registry = ServerRegistry::default();
        registry.install(vec![stdio_definition("Files")]);
        let err = registry
            .with_added(stdio_definition("files"))
            .expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateServer { name } if name == "files"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_rejects_unknown_server() {
        let registry = ServerRegistry::default();
        let err = registry.with_removed("ghost").expect_err("unknown");
        assert!(matches!(err, ConfigError::UnknownServer { name } if name == "ghost"));
    }

    #[test]
    fn remove_matches_case_insensitively() {
        let registry = ServerRegistry {
            definitions: vec![stdio_definition("Files"), stdio_definition("search")],
        };
        let candidate = registry.with_removed("FILES").expect("candidate");
        assert_eq!(candidate.len(), 1);
        assert_eq!(candidate[0].name, "search");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn find_ignores_case() {
        let registry = ServerRegistry {
            definitions: vec![stdio_definition("Files")],
        };
        assert!(registry.find("fiLES").is_some());
        assert!(registry.find("other").is_none());
    }
}
