//! Gateway configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `SHAKER_*` environment variables (`__` separates sections).
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! base_url = "https://agents.example.com"
//!
//! [tasks]
//! dir = "/var/lib/shaker/tasks"
//! subscriber_capacity = 10
//! default_list_limit = 100
//!
//! [realtime]
//! outbound_capacity = 256
//!
//! [streaming]
//! keepalive_secs = 15
//! ```

use crate::error::Result;
use crate::hub::DEFAULT_OUTBOUND_CAPACITY;
use crate::tasks::DEFAULT_SUBSCRIBER_CAPACITY;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SHAKER";

/// Complete gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub tasks: TaskSettings,

    #[serde(default)]
    pub realtime: RealtimeSettings,

    #[serde(default)]
    pub streaming: StreamingSettings,

    #[serde(default)]
    pub agent: AgentSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Public URL advertised in the agent card
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
        }
    }
}

/// Task store and manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Directory for one-file-per-task durability; in-memory only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,

    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            dir: None,
            subscriber_capacity: default_subscriber_capacity(),
            default_list_limit: default_list_limit(),
        }
    }
}

/// Realtime hub settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSettings {
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

/// SSE settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingSettings {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl StreamingSettings {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

/// Identity advertised in this gateway's agent card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_version")]
    pub version: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            version: default_agent_version(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_subscriber_capacity() -> usize {
    DEFAULT_SUBSCRIBER_CAPACITY
}

fn default_list_limit() -> usize {
    100
}

fn default_outbound_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY
}

fn default_keepalive_secs() -> u64 {
    15
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl GatewayConfig {
    /// Load defaults, an optional file and `SHAKER_*` overrides
    ///
    /// An explicitly given file must exist; otherwise `shaker.toml` in the
    /// working directory is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name("shaker.toml")
                .format(FileFormat::Toml)
                .required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                crate::error::ShakerError::Validation(format!(
                    "invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }

    /// Public base URL, falling back to localhost on the configured port
    pub fn base_url(&self) -> String {
        match &self.server.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tasks.subscriber_capacity, 10);
        assert_eq!(config.tasks.default_list_limit, 100);
        assert_eq!(config.realtime.outbound_capacity, 256);
        assert_eq!(config.streaming.keepalive(), Duration::from_secs(15));
        assert_eq!(config.base_url(), "http://localhost:8080");
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_load_file_with_env_override() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gateway.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000
base_url = "https://agents.example.com/"

[streaming]
keepalive_secs = 5
"#,
        )
        .unwrap();

        std::env::set_var("SHAKERCFGTEST_REALTIME__OUTBOUND_CAPACITY", "32");
        let config = GatewayConfig::load_with_prefix(Some(&path), "SHAKERCFGTEST").unwrap();
        std::env::remove_var("SHAKERCFGTEST_REALTIME__OUTBOUND_CAPACITY");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.base_url(), "https://agents.example.com");
        assert_eq!(config.streaming.keepalive_secs, 5);
        assert_eq!(config.realtime.outbound_capacity, 32);
        assert_eq!(config.tasks.default_list_limit, 100);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        let result = GatewayConfig::load(Some(&temp.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
