//! The middleware shape.
//!
//! A [`Middleware`] receives the rest of the pipeline as a [`BoxedHandler`]
//! and returns a new handler that decides whether, when and how often to run
//! it. Composition happens once at build time; running a pipeline is just
//! calling the outermost handler.

use crate::handler::{BoxFuture, BoxedHandler, Handler, NoErrorCheck};
use pylon_core::Exchange;
use std::sync::Arc;

/// A type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A stage that wraps the rest of the pipeline.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps `next`, returning the composed handler.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;

    /// A short name for logs and pipeline introspection.
    fn name(&self) -> &'static str {
        "middleware"
    }

    /// Whether the pipeline builder should put an error gate in front of
    /// this middleware. Defaults to `true`.
    fn check_error_before(&self) -> bool {
        true
    }
}

impl<M: Middleware> Middleware for NoErrorCheck<M> {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.0.wrap(next)
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

/// The remainder of the pipeline, as seen from inside a [`middleware_fn`]
/// closure.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Creates a `Next` around a handler.
    pub fn new(handler: &'a dyn Handler) -> Self {
        Self { handler }
    }

    /// Runs the rest of the pipeline.
    pub fn run<'b>(self, ex: &'b mut Exchange) -> BoxFuture<'b, ()>
    where
        'a: 'b,
    {
        self.handler.call(ex)
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// A middleware built from a closure.
///
/// Created by [`middleware_fn`].
pub struct MiddlewareFn<F> {
    name: &'static str,
    check_error: bool,
    func: Arc<F>,
}

/// Creates a middleware from a closure that receives the exchange and the
/// rest of the pipeline.
///
/// ```
/// use pylon_middleware::middleware_fn;
///
/// let timing = middleware_fn(|ex, next| {
///     Box::pin(async move {
///         let started = std::time::Instant::now();
///         next.run(ex).await;
///         tracing::debug!(elapsed = ?started.elapsed(), "done");
///     })
/// });
/// # let _ = timing;
/// ```
pub fn middleware_fn<F>(func: F) -> MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    MiddlewareFn {
        name: "middleware_fn",
        check_error: true,
        func: Arc::new(func),
    }
}

impl<F> MiddlewareFn<F> {
    /// Names the middleware.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Opts this middleware out of the automatic error gate.
    #[must_use]
    pub fn skip_error_check(mut self) -> Self {
        self.check_error = false;
        self
    }
}

impl<F> std::fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareFn")
            .field("name", &self.name)
            .field("check_error", &self.check_error)
            .finish_non_exhaustive()
    }
}

struct Wrapped<F> {
    name: &'static str,
    func: Arc<F>,
    next: BoxedHandler,
}

impl<F> Handler for Wrapped<F>
where
    F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        (self.func)(ex, Next::new(self.next.as_ref()))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl<F> Middleware for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Exchange, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Wrapped {
            name: self.name,
            func: Arc::clone(&self.func),
            next,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn check_error_before(&self) -> bool {
        self.check_error
    }
}

/// A middleware built from a function that maps `next` to a new handler.
pub struct WrapFn<F> {
    name: &'static str,
    check_error: bool,
    func: F,
}

/// Creates a middleware from a plain `next -> handler` function.
pub fn wrap_fn<F>(func: F) -> WrapFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    WrapFn {
        name: "wrap_fn",
        check_error: true,
        func,
    }
}

impl<F> WrapFn<F> {
    /// Names the middleware.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Opts this middleware out of the automatic error gate.
    #[must_use]
    pub fn skip_error_check(mut self) -> Self {
        self.check_error = false;
        self
    }
}

impl<F> Middleware for WrapFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self.func)(next)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn check_error_before(&self) -> bool {
        self.check_error
    }
}

/// A middleware that returns `next` unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMiddleware;

impl Middleware for EmptyMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        next
    }

    fn name(&self) -> &'static str {
        "empty"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, EmptyHandler};
    use bytes::Bytes;
    use http::{HeaderValue, StatusCode};

    fn exchange() -> Exchange {
        Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn test_middleware_fn_runs_around_next() {
        let mw = middleware_fn(|ex, next| {
            Box::pin(async move {
                ex.response_mut()
                    .headers_mut()
                    .insert("x-before", HeaderValue::from_static("1"));
                next.run(ex).await;
                let status = ex.response().status();
                ex.response_mut().headers_mut().insert(
                    "x-after",
                    HeaderValue::from_str(status.as_str()).unwrap(),
                );
            })
        });

        let inner = handler_fn(|ex| {
            Box::pin(async move {
                ex.respond_text(StatusCode::CREATED, "made");
            })
        });
        let composed = mw.wrap(Arc::new(inner));

        let mut ex = exchange();
        composed.call(&mut ex).await;

        let headers = ex.response().headers();
        assert_eq!(headers["x-before"], "1");
        assert_eq!(headers["x-after"], "201");
    }

    #[tokio::test]
    async fn test_middleware_may_short_circuit() {
        let deny = middleware_fn(|ex, _next| {
            Box::pin(async move {
                ex.respond_text(StatusCode::FORBIDDEN, "no");
            })
        });
        let reached = handler_fn(|ex| {
            Box::pin(async move {
                ex.respond_text(StatusCode::OK, "reached");
            })
        });

        let mut ex = exchange();
        deny.wrap(Arc::new(reached)).call(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_empty_middleware_is_identity() {
        let next: BoxedHandler = Arc::new(EmptyHandler);
        let wrapped = EmptyMiddleware.wrap(Arc::clone(&next));
        assert!(Arc::ptr_eq(&next, &wrapped));
        assert!(!Middleware::check_error_before(&EmptyMiddleware));
    }

    #[test]
    fn test_no_error_check_on_middleware() {
        let mw = NoErrorCheck(EmptyMiddleware);
        assert!(!Middleware::check_error_before(&mw));
        assert_eq!(Middleware::name(&mw), "empty");
    }
}
