//! Layered configuration loader.
//!
//! Layers, later ones winning:
//! 1. Defaults (or a preset)
//! 2. A TOML or JSON file
//! 3. `.env` file contents, exported into the process environment
//! 4. `PREFIX__SECTION__KEY` environment variables

use std::env;
use std::fs;
use std::path::Path;

use pylon_core::StoreBackend;
use pylon_middleware::stages::TrailingSlash;

use crate::{ConfigError, LogFormat, PylonConfig};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "PYLON";

/// Configuration loader.
///
/// # Example
///
/// ```no_run
/// use pylon_config::ConfigLoader;
///
/// # fn main() -> Result<(), pylon_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_optional_file("pylon.toml")?
///     .with_env_prefix("PYLON")
///     .load()?;
/// # let _ = config;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: PylonConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl ConfigLoader {
    /// Create a loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to default values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PylonConfig::default();
        self
    }

    /// Start from [`PylonConfig::development`].
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PylonConfig::development();
        self
    }

    /// Start from [`PylonConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = PylonConfig::production();
        self
    }

    /// Load a configuration file; the format follows the extension
    /// (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, has an
    /// unsupported extension or fails to parse (unknown fields included).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.config = parse(&content, &extension)?;
        self.file_loaded = true;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format
    /// (`"toml"` or `"json"`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use pylon_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[store]\nbackend = \"hashed\"\n", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.store.backend, pylon_config::StoreBackend::Hashed);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enable `PREFIX__SECTION__KEY` environment overrides, e.g.
    /// `PYLON__SERVER__HTTP_ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Export variables from a `.env` file in the working directory (or a
    /// parent), if there is one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if a `.env` file exists but is
    /// malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a file layer was applied.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or validation
    /// fails.
    pub fn load(self) -> Result<PylonConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed.
    pub fn load_unvalidated(mut self) -> Result<PylonConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_num(key, value)?;
            }
            ["SERVER", "MAX_CONNECTIONS"] => {
                config.server.max_connections = parse_num(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_num(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                config.server.max_body_bytes = parse_num(key, value)?;
            }
            ["SERVER", "SERVER_NAME"] => config.server.server_name = value.to_string(),

            ["STORE", "BACKEND"] => {
                config.store.backend = match value.to_lowercase().as_str() {
                    "linear" => StoreBackend::Linear,
                    "hashed" => StoreBackend::Hashed,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'linear' or 'hashed'",
                        ))
                    }
                };
            }
            ["STORE", "PREFILL"] => config.store.prefill = parse_num(key, value)?,
            ["STORE", "MAX_IDLE"] => config.store.max_idle = parse_num(key, value)?,

            ["PIPELINE", "STRICT_COMPONENTS"] => {
                config.pipeline.strict_components = require_bool(key, value)?;
            }
            ["PIPELINE", "ERROR_GATE"] => config.pipeline.error_gate = require_bool(key, value)?,
            ["PIPELINE", "RECOVER_PANICS"] => {
                config.pipeline.recover_panics = require_bool(key, value)?;
            }
            ["PIPELINE", "TRUST_INCOMING_REQUEST_ID"] => {
                config.pipeline.trust_incoming_request_id = require_bool(key, value)?;
            }
            ["PIPELINE", "TRAILING_SLASH"] => {
                config.pipeline.trailing_slash = match value.to_lowercase().as_str() {
                    "keep" => TrailingSlash::Keep,
                    "strip" => TrailingSlash::Strip,
                    "redirect" => TrailingSlash::Redirect,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'keep', 'strip' or 'redirect'",
                        ))
                    }
                };
            }
            ["PIPELINE", "PRETTY_JSON"] => config.pipeline.pretty_json = require_bool(key, value)?,
            ["PIPELINE", "RESOLVE_CLIENT_IP"] => {
                config.pipeline.resolve_client_ip = require_bool(key, value)?;
            }
            ["PIPELINE", "TRUSTED_PROXIES"] => {
                config.pipeline.trusted_proxies = value
                    .split(',')
                    .map(str::trim)
                    .filter(|cidr| !cidr.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = require_bool(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => config.logging.ansi_enabled = require_bool(key, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = require_bool(key, value)?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<PylonConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn require_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
