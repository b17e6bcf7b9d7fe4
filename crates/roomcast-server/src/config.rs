//! Server configuration.
//!
//! Configuration is layered:
//! - defaults
//! - a TOML file (`--config <path>`, or the first of the standard paths found)
//! - environment variables (`ROOMCAST_PORT`, `ROOMCAST_ROOMS__JOIN_NOTICE`, ...)

use anyhow::{Context, Result};
use roomcast_core::RouterConfig;
use roomcast_transport::MailboxConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Paths searched when no config file is given.
const CONFIG_PATHS: [&str; 3] = [
    "roomcast.toml",
    "/etc/roomcast/roomcast.toml",
    "~/.config/roomcast/roomcast.toml",
];

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "ROOMCAST";

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

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Room behaviour.
    #[serde(default)]
    pub rooms: RoomsConfig,

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

    /// Outbound queue capacity per connection.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// How long a send may wait on a full outbound queue, in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Room behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// Body of join notices.
    #[serde(default = "default_join_notice")]
    pub join_notice: String,

    /// Body of leave notices.
    #[serde(default = "default_leave_notice")]
    pub leave_notice: String,

    /// Close reason sent to a departing connection.
    #[serde(default = "default_close_reason")]
    pub close_reason: String,

    /// Tell remaining members when someone disconnects.
    #[serde(default)]
    pub announce_disconnect: bool,

    /// Delete rooms once their last member leaves.
    #[serde(default = "default_true")]
    pub auto_delete_empty_rooms: bool,
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
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws/connect".to_string()
}

fn default_outbound_queue() -> usize {
    256
}

fn default_send_timeout() -> u64 {
    500
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_join_notice() -> String {
    "member joined".to_string()
}

fn default_leave_notice() -> String {
    "member left".to_string()
}

fn default_close_reason() -> String {
    "connection closed".to_string()
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
            limits: LimitsConfig::default(),
            rooms: RoomsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            outbound_queue: default_outbound_queue(),
            send_timeout_ms: default_send_timeout(),
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

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            join_notice: default_join_notice(),
            leave_notice: default_leave_notice(),
            close_reason: default_close_reason(),
            announce_disconnect: false,
            auto_delete_empty_rooms: true,
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
    /// Load configuration from a file and the environment.
    ///
    /// With no explicit path, the standard paths are tried in order. A
    /// missing file is not an error; an explicit path that does not exist is.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or an environment override cannot
    /// be parsed.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let expanded = shellexpand::tilde(path).into_owned();
                if !Path::new(&expanded).exists() {
                    anyhow::bail!("Config file not found: {}", expanded);
                }
                Some(expanded)
            }
            None => CONFIG_PATHS
                .iter()
                .map(|p| shellexpand::tilde(p).into_owned())
                .find(|p| Path::new(p).exists()),
        };

        let mut builder = ::config::Config::builder();
        if let Some(file) = &file {
            tracing::info!("Loading config from {}", file);
            builder = builder.add_source(::config::File::new(file, ::config::FileFormat::Toml));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")
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

    /// Router settings derived from this configuration.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            join_notice: self.rooms.join_notice.clone(),
            leave_notice: self.rooms.leave_notice.clone(),
            close_reason: self.rooms.close_reason.clone(),
            announce_disconnect: self.rooms.announce_disconnect,
            auto_delete_empty_rooms: self.rooms.auto_delete_empty_rooms,
        }
    }

    /// Mailbox settings derived from this configuration.
    #[must_use]
    pub fn mailbox_config(&self) -> MailboxConfig {
        MailboxConfig {
            capacity: self.transport.outbound_queue,
            send_timeout: Duration::from_millis(self.transport.send_timeout_ms),
        }
    }
}
