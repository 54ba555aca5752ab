//! Main configuration types.
//!
//! This module provides the top-level [`PylonConfig`] struct and its builder.

use pylon_middleware::stages::TrustedNet;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, LoggingConfig, PipelineConfig, ServerConfig, StoreManagerConfig};

/// Complete Pylon configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use pylon_config::PylonConfig;
///
/// let config = PylonConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.store.prefill, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PylonConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Envelope pool configuration.
    #[serde(default)]
    pub store: StoreManagerConfig,

    /// Pipeline assembly options.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PylonConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PylonConfigBuilder {
        PylonConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `server.http_addr` is not a socket address
    /// - `server.max_connections` or `server.max_body_bytes` is zero
    /// - `store.prefill` exceeds `store.max_idle`
    /// - `logging.level` is not a valid filter directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than zero",
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }

        if self.store.prefill > self.store.max_idle {
            return Err(ConfigError::invalid_value(
                "store.prefill",
                format!(
                    "{} exceeds store.max_idle ({})",
                    self.store.prefill, self.store.max_idle
                ),
            ));
        }

        for cidr in &self.pipeline.trusted_proxies {
            cidr.parse::<TrustedNet>()
                .map_err(|e| ConfigError::invalid_value("pipeline.trusted_proxies", e.to_string()))?;
        }

        if self.logging.enabled {
            pylon_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, panics recovered, a small
    /// pool.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = crate::LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;

        config.store.prefill = 4;
        config.pipeline.pretty_json = true;

        config
    }

    /// Production preset: JSON logs, strict component checks.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = crate::LogFormat::Json;
        config.logging.ansi_enabled = false;

        config.pipeline.strict_components = true;

        config
    }
}

/// Builder for [`PylonConfig`].
#[derive(Debug, Default)]
pub struct PylonConfigBuilder {
    server: Option<ServerConfig>,
    store: Option<StoreManagerConfig>,
    pipeline: Option<PipelineConfig>,
    logging: Option<LoggingConfig>,
}

impl PylonConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the store configuration.
    #[must_use]
    pub fn store(mut self, store: StoreManagerConfig) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the pipeline configuration.
    #[must_use]
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> PylonConfig {
        PylonConfig {
            server: self.server.unwrap_or_default(),
            store: self.store.unwrap_or_default(),
            pipeline: self.pipeline.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<PylonConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
