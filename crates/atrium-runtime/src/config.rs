//! Host configuration.
//!
//! The bridge address and event-bus tuning come from a TOML file
//! (`ATRIUM_CONFIG`, default `atrium.toml`) with environment-variable
//! overrides. Each `[plugins.<id>]` table is handed opaquely to that
//! plugin through its context; the runtime never interprets the keys.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::bus::DEFAULT_EVENT_CAPACITY;
use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub event_capacity: usize,
    plugins: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    events: EventsSection,
    #[serde(default)]
    plugins: HashMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct EventsSection {
    #[serde(default = "default_event_capacity")]
    capacity: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_capacity: default_event_capacity(),
            plugins: HashMap::new(),
        }
    }
}

impl HostConfig {
    /// Parse a host configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, RuntimeError> {
        let file: ConfigFile = toml::from_str(toml_str)?;
        let plugins = file
            .plugins
            .into_iter()
            .map(|(id, value)| {
                let json = serde_json::to_value(value).unwrap_or(Value::Null);
                (id, json)
            })
            .collect();
        Ok(Self {
            host: file.server.host,
            port: file.server.port,
            event_capacity: file.events.capacity,
            plugins,
        })
    }

    /// Load a host configuration file.
    pub fn load(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Load configuration from `ATRIUM_CONFIG` (default `atrium.toml`),
    /// falling back to defaults when the file is absent, then apply
    /// `ATRIUM_HOST` / `ATRIUM_PORT` overrides.
    pub fn from_env() -> Self {
        let path = env::var("ATRIUM_CONFIG").unwrap_or_else(|_| "atrium.toml".to_string());
        let mut config = if Path::new(&path).exists() {
            match Self::load(Path::new(&path)) {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!("failed to load {path}: {e}, using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        if let Ok(host) = env::var("ATRIUM_HOST") {
            config.host = host;
        }
        if let Some(port) = env::var("ATRIUM_PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        config
    }

    /// Insert or replace one plugin's configuration table. Used by
    /// embedding code and tests that assemble configuration manually.
    pub fn set_plugin_config(&mut self, plugin_id: &str, value: Value) {
        self.plugins.insert(plugin_id.to_string(), value);
    }

    /// The configuration table for one plugin; an empty object when the
    /// file declared none.
    pub fn plugin_config(&self, plugin_id: &str) -> Value {
        self.plugins
            .get(plugin_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
