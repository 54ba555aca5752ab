//! # Pylon Middleware
//!
//! Composition engine for Pylon pipelines.
//!
//! A pipeline is declared as an ordered list of mixed items, each either a
//! [`Middleware`] (wraps the rest of the pipeline) or a [`Handler`] (terminal
//! step). The builder classifies every item, inserts an [`ErrorGate`] in
//! front of each one that has not opted out, and fuses the list into a
//! single entry handler whose execution order equals declaration order.
//!
//! ## Error Flow
//!
//! ```text
//!  StoreInit ─▶ ErrorHandlerStage ─▶ gate ─▶ MW_A ─▶ gate ─▶ MW_B ─▶ gate(H_C)
//!                    ▲                        │
//!                    │           records error│ gates skip the rest
//!                    └──── reports error ◀────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use pylon_middleware::{components, handler_fn, middleware_fn, Pipeline};
//! use pylon_middleware::stages::{Recover, StoreInit};
//! use pylon_middleware::ErrorHandlerStage;
//! use http::StatusCode;
//!
//! let pipeline = Pipeline::builder()
//!     .components(components![
//!         StoreInit::default(),
//!         ErrorHandlerStage::default(),
//!         Recover,
//!         middleware_fn(|ex, next| next.run(ex)),
//!         handler_fn(|ex| Box::pin(async move {
//!             ex.respond_text(StatusCode::OK, "ok");
//!         })),
//!     ])
//!     .build()
//!     .unwrap();
//! # let _ = pipeline;
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod component;
mod gate;
mod handler;
mod merge;
mod middleware;
pub mod pipeline;
pub mod stages;

pub use component::{classify, Component, IntoComponent, Shape};
pub use gate::{default_error_callback, error_gate, ErrorCallback, ErrorGate, ErrorHandlerStage};
pub use handler::{
    handler_fn, no_error_check, BoxFuture, BoxedHandler, EmptyHandler, Handler, HandlerFn,
    NoErrorCheck,
};
pub use merge::{compose, handler_after_next, handler_before_next, merge_handlers, merge_middlewares};
pub use middleware::{
    middleware_fn, wrap_fn, BoxedMiddleware, EmptyMiddleware, Middleware, MiddlewareFn, Next,
    WrapFn,
};
pub use pipeline::{build, build_strict, Built, Pipeline, PipelineBuilder, PipelineError};
