//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`--config`, or the first of the search paths)
//! - Environment variables (`SWITCHBOARD__*`, nested keys joined by `__`)
//! - `SWITCHBOARD_HOST` / `SWITCHBOARD_PORT` as defaults for host and port

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Files tried, in order, when no path is given.
const CONFIG_PATHS: [&str; 3] = [
    "switchboard.toml",
    "/etc/switchboard/switchboard.toml",
    "~/.config/switchboard/switchboard.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Handlers served by this instance.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Path answering plain HTTP health checks.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Drop a channel once its last connection leaves.
    #[serde(default = "default_true")]
    pub prune_empty_channels: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// One `[[routes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Channel the route serves.
    pub channel: String,

    /// Message type the route serves.
    #[serde(rename = "type")]
    pub message_type: String,

    /// What to answer.
    #[serde(default)]
    pub action: RouteAction,

    /// Reply body for [`RouteAction::Reply`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Behaviour of a configured route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    /// Reply with the inbound message.
    #[default]
    Echo,
    /// Reply with the configured `value`.
    Reply,
    /// Handle the message without replying.
    Silent,
}

// Default value functions
fn default_host() -> String {
    std::env::var("SWITCHBOARD_HOST").unwrap_or_else(|_| "::".to_string())
}

fn default_port() -> u16 {
    std::env::var("SWITCHBOARD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            registry: RegistryConfig::default(),
            metrics: MetricsConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            health_path: default_health_path(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prune_empty_channels: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration, layering environment variables over a file.
    ///
    /// Uses `path` when given, otherwise the first existing search path.
    /// Without any file the defaults apply.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or if the merged
    /// configuration cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                bail!("Config file not found: {}", path.display())
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::search(),
        };

        let mut builder = ::config::Config::builder();
        if let Some(file) = &file {
            tracing::debug!("Loading config from {}", file.display());
            builder = builder.add_source(
                ::config::File::from(file.as_path()).format(::config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("SWITCHBOARD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(::config::Config::try_deserialize)
            .context("Failed to load configuration")?;

        Ok(config)
    }

    /// First search path that exists.
    fn search() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
            .find(|path| path.exists())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid host: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.max_message_size, 64 * 1024);
        assert_eq!(config.transport.health_path, "/health");
        assert!(config.registry.prune_empty_channels);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "::".to_string(),
            port: 8080,
            ..Config::default()
        };
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_unspecified());

        let bad = Config {
            host: "example.com".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [registry]
            prune_empty_channels = false

            [[routes]]
            channel = "game42"
            type = "move"

            [[routes]]
            channel = "lobby"
            type = "ping"
            action = "reply"
            value = { pong = true }

            [[routes]]
            channel = "lobby"
            type = "log"
            action = "silent"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert!(!config.registry.prune_empty_channels);
        assert_eq!(config.routes.len(), 3);
        assert_eq!(config.routes[0].action, RouteAction::Echo);
        assert_eq!(config.routes[1].action, RouteAction::Reply);
        assert_eq!(config.routes[1].value, Some(json!({"pong": true})));
        assert_eq!(config.routes[2].action, RouteAction::Silent);
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!(
            "switchboard-config-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "port = 7001\n[transport]\nhealth_path = \"/ready\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 7001);
        assert_eq!(config.transport.health_path, "/ready");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/switchboard.toml"))).is_err());
    }
}
