//! Configuration schema types.
//!
//! This module defines the structure of each configuration section. The
//! `store` section reuses [`StoreManagerConfig`] from `pylon-core`.

use pylon_middleware::stages::TrailingSlash;
use pylon_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

pub use pylon_core::{StoreBackend, StoreManagerConfig};

/// Server configuration section.
///
/// # Example
///
/// ```
/// use pylon_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-request timeout in milliseconds. `0` disables it.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Largest request body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Value of the `Server` response header. Empty disables it.
    #[serde(default)]
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            request_timeout_ms: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
            server_name: String::new(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    10_000
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// Pipeline assembly options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Reject unclassifiable components instead of skipping them.
    #[serde(default)]
    pub strict_components: bool,

    /// Place the error gate in front of each stage.
    #[serde(default = "default_true")]
    pub error_gate: bool,

    /// Install the panic-recovery stage.
    #[serde(default = "default_true")]
    pub recover_panics: bool,

    /// Forward `X-Request-ID` from clients instead of always generating one.
    #[serde(default)]
    pub trust_incoming_request_id: bool,

    /// Trailing-slash handling.
    #[serde(default)]
    pub trailing_slash: TrailingSlash,

    /// Indent JSON response bodies.
    #[serde(default)]
    pub pretty_json: bool,

    /// Install the client-address stage.
    #[serde(default)]
    pub resolve_client_ip: bool,

    /// Proxy networks skipped when reading `X-Forwarded-For`, in CIDR
    /// notation.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strict_components: false,
            error_gate: true,
            recover_panics: true,
            trust_incoming_request_id: false,
            trailing_slash: TrailingSlash::default(),
            pretty_json: false,
            resolve_client_ip: false,
            trusted_proxies: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info", "pylon_server=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit ANSI colour codes.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include file and line in events.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Converts the section into the subscriber settings.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            span_events: false,
            file_line_info: self.include_location,
            thread_ids: false,
            ansi: self.ansi_enabled,
        }
    }
}
