//! Persisted settings and config-root resolution.
//!
//! Everything the process remembers between runs lives under one directory:
//! `$ASTROLABE_HOME` when set, `~/.astrolabe` otherwise. Settings are TOML;
//! the tool-server registry keeps its own JSON file next to them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const HOME_ENV: &str = "ASTROLABE_HOME";

const DEFAULT_ROOT: &str = "~/.astrolabe";
const SETTINGS_FILE: &str = "config.toml";
const REGISTRY_FILE: &str = "servers.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a home directory for the config root")]
    NoHome,

    #[error("failed to create config root at {path:?}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse server registry from {path:?}: {source}")]
    ParseRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },

    #[error("failed to serialize server registry: {source}")]
    SerializeRegistry {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("tool server '{name}' is already configured")]
    DuplicateServer { name: String },

    #[error("tool server '{name}' is not configured")]
    UnknownServer { name: String },

    #[error("malformed {what} '{entry}', expected {expected}")]
    MalformedEntry {
        what: &'static str,
        entry: String,
        expected: &'static str,
    },
}

/// Resolves the config root without touching the filesystem.
pub fn config_root() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let expanded = shellexpand::tilde(DEFAULT_ROOT);
    let path = PathBuf::from(expanded.as_ref());
    if path.starts_with("~") {
        return Err(ConfigError::NoHome);
    }
    Ok(path)
}

/// Creates the config root if it does not exist yet.
pub fn ensure_root(root: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(root).map_err(|source| ConfigError::CreateRoot {
        path: root.to_path_buf(),
        source,
    })
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

/// User-facing settings stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    pub think: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_limit: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: None,
            think: false,
            context_limit: None,
        }
    }
}

impl Settings {
    /// Loads settings from the config root; a missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = settings_path(root);
        debug!(path = %path.display(), "reading settings");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                debug!("no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let path = settings_path(root);
        let content =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(&path, content).map_err(|source| ConfigError::Write { path, source })
    }

    /// Validates and stores a new backend base URL, normalized without a
    /// trailing slash.
    pub fn set_base_url(&mut self, url: &str) -> Result<(), ConfigError> {
        let parsed = reqwest::Url::parse(url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: url.to_string(),
            reason: source.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        self.base_url = url.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Backend options for the chat request; currently just the context
    /// window when one is configured.
    pub fn backend_options(&self) -> Option<Map<String, Value>> {
        self.context_limit.map(|limit| {
            let mut options = Map::new();
            options.insert("num_ctx".to_string(), json!(limit));
            options
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let settings = Settings::load(dir.path()).expect("load");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.default_model, None);
        assert!(!settings.think);
    }

    #[test]
    fn settings_round_trip() {
        let dir = tempdir().expect("tempdir");
        let mut settings = Settings::default();
        settings.default_model = Some("llama3.2".to_string());
        settings.context_limit = Some(8192);
        settings.save(dir.path()).expect("save");

        let loaded = Settings::load(dir.path()).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let mut settings = Settings::default();
        let err = settings.set_base_url("localhost:11434").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let mut settings = Settings::default();
        let err = settings.set_base_url("ftp://example.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn accepts_and_normalizes_base_url() {
        let mut settings = Settings::default();
        settings
            .set_base_url("http://127.0.0.1:11434/")
            .expect("valid url");
        assert_eq!(settings.base_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn backend_options_carry_context_limit() {
        let mut settings = Settings::default();
        assert!(settings.backend_options().is_none());
        settings.context_limit = Some(4096);
        let options = settings.backend_options().expect("options");
        assert_eq!(options["num_ctx"], json!(4096));
    }
}
