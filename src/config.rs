//! Agent configuration: a plain JSON file, not a database.
//!
//! Grounded in the teacher's `rustdesk/config.rs` (`#[serde(default)]`
//! struct, `ensure_uuid`-style persisted identity) but reshaped into the
//! flat `{server, relay, uuid}` document this agent actually reads and
//! writes, matching `DeskServer::loadConfig`/`saveConfig` in the original
//! program: missing or invalid JSON is silently replaced by defaults and
//! rewritten, never treated as fatal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

const DEFAULT_SERVER_PORT: u16 = 21116;
const DEFAULT_RELAY_PORT: u16 = 21117;
const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub ip: String,
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// The on-disk shape of `DeskServer.json`, matching §6 of the spec exactly:
/// `{"server": {...}, "relay": {...}, "uuid": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: EndpointConfig,
    pub relay: EndpointConfig,
    pub uuid: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: EndpointConfig {
                ip: DEFAULT_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
            },
            relay: EndpointConfig {
                ip: DEFAULT_HOST.to_string(),
                port: DEFAULT_RELAY_PORT,
            },
            uuid: String::new(),
        }
    }
}

impl AgentConfig {
    /// Load from `path`, falling back to (and persisting) defaults when the
    /// file is absent, unreadable, or not a valid JSON object — mirroring
    /// `DeskServer::loadConfig`'s "if not valid, replace and rewrite" rule.
    /// An absent or empty `uuid` is regenerated here too.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<AgentConfig>(&text).unwrap_or_default(),
            Err(_) => AgentConfig::default(),
        };

        let mut dirty = config.uuid.trim().is_empty();
        if dirty {
            config.uuid = uuid::Uuid::new_v4().to_string();
        }

        // A freshly-defaulted config (file missing/invalid) is always
        // rewritten, even if by coincidence its uuid happened to be set.
        if !path.exists() {
            dirty = true;
        }

        if dirty {
            config.save(path)?;
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(AgentError::Transient)
    }

    pub fn server_endpoint(&self) -> &EndpointConfig {
        &self.server
    }

    pub fn relay_endpoint(&self) -> &EndpointConfig {
        &self.relay
    }
}

/// Default config file path, matching the original's relative `DeskServer.json`
/// in the process's working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("DeskServer.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults_and_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DeskServer.json");
        assert!(!path.exists());

        let config = AgentConfig::load_or_init(&path).unwrap();
        assert_eq!(config.server.ip, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.relay.port, DEFAULT_RELAY_PORT);
        assert!(!config.uuid.is_empty());
        assert!(path.exists());

        // uuid is a bare 32-hex-digit string, no braces.
        assert!(uuid::Uuid::parse_str(&config.uuid).is_ok());
        assert!(!config.uuid.contains('{'));
    }

    #[test]
    fn invalid_json_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DeskServer.json");
        std::fs::write(&path, "not json").unwrap();

        let config = AgentConfig::load_or_init(&path).unwrap();
        assert_eq!(config.server.ip, DEFAULT_HOST);
        assert!(!config.uuid.is_empty());
    }

    #[test]
    fn empty_uuid_in_existing_file_is_regenerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DeskServer.json");
        std::fs::write(
            &path,
            r#"{"server":{"ip":"10.0.0.1","port":1234},"relay":{"ip":"10.0.0.2","port":5678},"uuid":""}"#,
        )
        .unwrap();

        let config = AgentConfig::load_or_init(&path).unwrap();
        assert_eq!(config.server.ip, "10.0.0.1");
        assert!(!config.uuid.is_empty());
    }

    #[test]
    fn valid_existing_config_is_preserved_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("DeskServer.json");
        let uuid = uuid::Uuid::new_v4().to_string();
        std::fs::write(
            &path,
            format!(
                r#"{{"server":{{"ip":"10.0.0.1","port":1234}},"relay":{{"ip":"10.0.0.2","port":5678}},"uuid":"{uuid}"}}"#
            ),
        )
        .unwrap();

        let config = AgentConfig::load_or_init(&path).unwrap();
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.relay.port, 5678);
        assert_eq!(config.uuid, uuid);
    }
}
