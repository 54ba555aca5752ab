//! # Pylon Server
//!
//! Routing and HTTP serving for Pylon pipelines.
//!
//! - [`Router`]: method and path routing via `matchit`, route groups, custom
//!   not-found and method-not-allowed handlers, and the built-in global
//!   stages selected by [`RouterOptions`]
//! - [`Server`]: HTTP/1.1 over hyper with body limits, request timeouts and
//!   graceful shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use pylon_middleware::{components, handler_fn};
//! use pylon_server::{Router, RouterOptions, Server};
//! use pylon_config::ServerConfig;
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new(RouterOptions::default());
//!     router.get("/health", components![handler_fn(|ex| Box::pin(async move {
//!         ex.respond_text(StatusCode::OK, "ok");
//!     }))]);
//!
//!     Server::new(ServerConfig::default(), router.build()?).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod router;
pub mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use router::{path_param, path_params, PathParams, PathParamsKey, RouteGroup, Router, RouterOptions};
pub use server::{HttpResponse, ResponseBody, Server};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
