//! Typed configuration for Pylon.
//!
//! [`PylonConfig`] gathers four sections:
//!
//! - [`ServerConfig`]: bind address, limits and timeouts
//! - [`StoreManagerConfig`]: envelope pool sizing and store backend
//! - [`PipelineConfig`]: component strictness, error gate, built-in stages
//! - [`LoggingConfig`]: subscriber settings
//!
//! Every section rejects unknown fields. [`ConfigLoader`] layers defaults, a
//! file, `.env` and `PYLON__SECTION__KEY` environment variables.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! server_name = "pylon"
//!
//! [store]
//! backend = "linear"
//! prefill = 32
//! max_idle = 1024
//!
//! [pipeline]
//! strict_components = false
//! trailing_slash = "redirect"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::{PylonConfig, PylonConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use pylon_telemetry::LogFormat;
pub use schema::{
    LoggingConfig, PipelineConfig, ServerConfig, StoreBackend, StoreManagerConfig,
};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
