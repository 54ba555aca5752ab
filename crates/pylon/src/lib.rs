//! # Pylon
//!
//! Request-scoped storage and error-gated middleware pipelines for async
//! HTTP services.
//!
//! - **Keyed store envelopes**: every request gets a pooled, typed key/value
//!   store plus error, flag and codec slots ([`core`])
//! - **Mixed pipelines**: declare middlewares and handlers in one ordered
//!   list; execution follows declaration order ([`middleware`])
//! - **Error gating**: once a stage records an error the rest is skipped and
//!   the error-handler stage reports it
//! - **Batteries**: layered config, structured logging, a `matchit` router
//!   and a hyper server
//!
//! ## Architecture
//!
//! ```text
//! Request → StoreInit → ErrorHandler → Recover → RequestId → … → Router → route stages
//!                            ↑                                                │
//!                            └──────────── recorded error ◀───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pylon::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("PYLON").load()?;
//!     init_logging(&config.logging.to_log_config())?;
//!
//!     let mut router = Router::new(RouterOptions::from_config(&config));
//!     router.get("/ping", components![handler_fn(|ex| Box::pin(async move {
//!         ex.respond_text(http::StatusCode::OK, "pong");
//!     }))]);
//!
//!     Server::new(config.server.clone(), router.build()?).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/pylon/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use pylon_config as config;
pub use pylon_core as core;
pub use pylon_middleware as middleware;
pub use pylon_server as server;
pub use pylon_telemetry as telemetry;

pub use pylon_middleware::components;

/// Prelude module for convenient imports.
///
/// ```rust
/// use pylon::prelude::*;
/// ```
pub mod prelude {
    pub use pylon_core::{
        CallContext, CancelSignal, CodecPair, Exchange, Flags, HttpError, JsonCodec,
        RecordedError, StoreBackend, StoreManager,
    };

    pub use pylon_middleware::stages::{
        abort_if, abort_with, real_ip, CustomHeaders, RealIp, Recover, RequestIdKey,
        RequestIdMiddleware, StoreInit, TrailingSlash, UseCodec,
    };
    pub use pylon_middleware::{
        components, handler_fn, middleware_fn, no_error_check, BoxFuture, BoxedHandler,
        BoxedMiddleware, Component, ErrorHandlerStage, Handler, IntoComponent, Middleware, Next,
        Pipeline,
    };

    pub use pylon_config::{ConfigLoader, PylonConfig};
    pub use pylon_telemetry::{init_logging, LogConfig};

    pub use pylon_server::{path_param, Router, RouterOptions, Server, ShutdownSignal};
}
