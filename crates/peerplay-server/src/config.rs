//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PEERPLAY_HOST, PEERPLAY_PORT, PORT)
//! - TOML configuration file
//! - `--config <path>` on the command line

use anyhow::{Context, Result};
use peerplay_core::{MembershipPolicy, RegistryConfig, RelayConfig, DEFAULT_USERNAME};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

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

    /// Cross-origin policy for the WebSocket upgrade.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Relay behaviour.
    #[serde(default)]
    pub relay: RelaySettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Origins allowed to open a WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed `Origin` header values. Empty allows every origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Check whether a request with this `Origin` may connect.
    ///
    /// Requests without an origin (native apps, curl) are always allowed.
    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(_) if self.allowed_origins.is_empty() => true,
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
        }
    }
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Send `welcome` to every other peer when someone connects.
    #[serde(default = "default_true")]
    pub greet_on_connect: bool,

    /// Delete rooms when their last member leaves.
    #[serde(default = "default_true")]
    pub prune_empty_rooms: bool,

    /// `multi_room` or `single_room`.
    #[serde(default)]
    pub membership: MembershipPolicy,

    /// Extra attempts for a failed channel join.
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Display name for handshakes without `username`.
    #[serde(default = "default_username")]
    pub default_username: String,
}

impl RelaySettings {
    /// Relay configuration for the core.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            greet_on_connect: self.greet_on_connect,
            membership: self.membership,
            transport_retries: self.transport_retries,
            default_username: self.default_username.clone(),
        }
    }

    /// Registry configuration for the core.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            prune_empty_rooms: self.prune_empty_rooms,
        }
    }
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

// Default value functions
fn default_host() -> String {
    std::env::var("PEERPLAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("PEERPLAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4000)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "https://peerplay.space".to_string(),
    ]
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_transport_retries() -> u32 {
    1
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
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
            cors: CorsConfig::default(),
            limits: LimitsConfig::default(),
            relay: RelaySettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            greet_on_connect: true,
            prune_empty_rooms: true,
            membership: MembershipPolicy::default(),
            transport_retries: default_transport_retries(),
            default_username: default_username(),
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
    /// Load configuration from the path given with `--config`, the default
    /// search paths, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path_from_args(std::env::args()) {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        let config_paths = [
            "peerplay.toml",
            "/etc/peerplay/peerplay.toml",
            "~/.config/peerplay/peerplay.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

/// Extract the value of `--config <path>` or `--config=<path>`.
fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert!(config.relay.greet_on_connect);
        assert!(config.relay.prune_empty_rooms);
        assert_eq!(config.relay.membership, MembershipPolicy::MultiRoom);
        assert_eq!(config.relay.default_username, "Anonymous");
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 4000;
        assert_eq!(config.bind_addr().unwrap().port(), 4000);

        config.host = "not a host".to_string();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [cors]
            allowed_origins = ["https://watch.example"]

            [relay]
            membership = "single_room"
            greet_on_connect = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.relay.membership, MembershipPolicy::SingleRoom);
        assert!(!config.relay.relay_config().greet_on_connect);
        assert!(config.relay.registry_config().prune_empty_rooms);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_cors_allows() {
        let cors = CorsConfig::default();
        assert!(cors.allows(None));
        assert!(cors.allows(Some("https://peerplay.space")));
        assert!(!cors.allows(Some("https://evil.example")));

        let open = CorsConfig {
            allowed_origins: Vec::new(),
        };
        assert!(open.allows(Some("https://anything.example")));
    }

    #[test]
    fn test_config_path_from_args() {
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            config_path_from_args(args(&["peerplay", "--config", "a.toml"])),
            Some("a.toml".to_string())
        );
        assert_eq!(
            config_path_from_args(args(&["peerplay", "--config=b.toml"])),
            Some("b.toml".to_string())
        );
        assert_eq!(config_path_from_args(args(&["peerplay"])), None);
    }
}
