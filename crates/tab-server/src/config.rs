use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tab_engine::EngineConfig;
use tab_lifecycle::LifecycleConfig;
use tab_service::ServiceConfig;

use crate::error::{ServerError, ServerResult};

/// HTTP listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Largest accepted receipt photo, in bytes.
    pub max_upload_bytes: usize,
    /// Photos staged per session before a receipt is recognized.
    pub max_staged_photos: usize,
    /// Longest a `events/next` request waits, in milliseconds.
    pub event_poll_timeout_ms: u64,
    /// Per-session event buffer; slower subscribers lose the oldest events.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_upload_bytes: 5 * 1024 * 1024,
            max_staged_photos: 10,
            event_poll_timeout_ms: 25_000,
            event_buffer: 256,
        }
    }
}

/// Everything `tabsplit serve` reads from its TOML file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub lifecycle: LifecycleConfig,
    pub engine: EngineConfig,
}

impl TabConfig {
    /// Read a TOML configuration file. Missing sections keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }
}
