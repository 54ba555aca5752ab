//! Logging setup for Pylon.
//!
//! Pylon crates emit events through `tracing`; this crate installs the
//! subscriber that formats them:
//!
//! - JSON lines in production, pretty output in development
//! - Filtering with `EnvFilter` directives
//! - Standard field names in [`logging::fields`]
//!
//! # Example
//!
//! ```rust,ignore
//! use pylon_telemetry::{init_logging, LogConfig};
//!
//! fn main() -> pylon_telemetry::TelemetryResult<()> {
//!     init_logging(&LogConfig::production())?;
//!     tracing::info!("service started");
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
