//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

impl Config {
    /// Load configuration from `grinder.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("grinder.toml");
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No grinder.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// WebSocket URL of the relay.
    #[serde(default = "default_url")]
    pub url: String,
    /// Topic namespace prefix shared by all peers.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            namespace: default_namespace(),
        }
    }
}

/// Local player settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Display name; empty means derive one from the generated peer id.
    #[serde(default)]
    pub name: String,
    /// Room to join when none is supplied.
    #[serde(default = "default_room")]
    pub room: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            room: default_room(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:9001".to_string()
}

fn default_namespace() -> String {
    protocol::topics::DEFAULT_NAMESPACE.to_string()
}

fn default_room() -> String {
    "RACE1".to_string()
}
