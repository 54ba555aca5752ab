//! The handler shape.
//!
//! A [`Handler`] is a terminal step: it receives the [`Exchange`], writes a
//! response and/or records an error into the envelope, and does not delegate
//! to anything further.
//!
//! # Example
//!
//! ```
//! use pylon_middleware::{handler_fn, Handler};
//! use http::StatusCode;
//!
//! let hello = handler_fn(|ex| {
//!     Box::pin(async move {
//!         ex.respond_text(StatusCode::OK, "hello");
//!     })
//! });
//! assert!(hello.check_error_before());
//! ```

use pylon_core::Exchange;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased handler that can be shared between pipelines.
pub type BoxedHandler = Arc<dyn Handler>;

/// A terminal step of a pipeline.
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler.
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()>;

    /// A short name for logs and pipeline introspection.
    fn name(&self) -> &'static str {
        "handler"
    }

    /// Whether the pipeline builder should put an error gate in front of
    /// this handler. Defaults to `true`.
    fn check_error_before(&self) -> bool {
        true
    }
}

/// A handler built from a closure.
///
/// Created by [`handler_fn`].
pub struct HandlerFn<F> {
    name: &'static str,
    check_error: bool,
    func: F,
}

/// Creates a handler from a closure returning a boxed future.
pub fn handler_fn<F>(func: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn {
        name: "handler_fn",
        check_error: true,
        func,
    }
}

impl<F> HandlerFn<F> {
    /// Names the handler.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Opts this handler out of the automatic error gate.
    #[must_use]
    pub fn skip_error_check(mut self) -> Self {
        self.check_error = false;
        self
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        (self.func)(ex)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn check_error_before(&self) -> bool {
        self.check_error
    }
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn")
            .field("name", &self.name)
            .field("check_error", &self.check_error)
            .finish_non_exhaustive()
    }
}

/// A handler that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyHandler;

impl Handler for EmptyHandler {
    fn call<'a>(&'a self, _ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn name(&self) -> &'static str {
        "empty"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

/// Wraps a handler or middleware and opts it out of the automatic error gate.
///
/// ```
/// use pylon_middleware::{no_error_check, EmptyHandler, Handler};
///
/// assert!(!no_error_check(EmptyHandler).check_error_before());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NoErrorCheck<T>(pub T);

/// Opts `inner` out of the automatic error gate.
pub const fn no_error_check<T>(inner: T) -> NoErrorCheck<T> {
    NoErrorCheck(inner)
}

impl<H: Handler> Handler for NoErrorCheck<H> {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        self.0.call(ex)
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn check_error_before(&self) -> bool {
        false
    }
}
