//! Combinators that fuse handlers and middleware.

use crate::handler::{BoxFuture, BoxedHandler, EmptyHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware};
use pylon_core::Exchange;
use std::sync::Arc;

struct Sequence {
    handlers: Vec<BoxedHandler>,
}

impl Handler for Sequence {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for handler in &self.handlers {
                handler.call(ex).await;
            }
        })
    }

    fn name(&self) -> &'static str {
        "sequence"
    }
}

/// Fuses handlers into one that runs them in order.
///
/// Returns `None` for an empty list and the handler itself for a list of one.
#[must_use]
pub fn merge_handlers(mut handlers: Vec<BoxedHandler>) -> Option<BoxedHandler> {
    match handlers.len() {
        0 => None,
        1 => handlers.pop(),
        _ => Some(Arc::new(Sequence { handlers })),
    }
}

/// Wraps `handler` in `middlewares`, first-declared outermost.
#[must_use]
pub fn merge_middlewares(middlewares: &[BoxedMiddleware], handler: BoxedHandler) -> BoxedHandler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, mw| mw.wrap(next))
}

/// Like [`merge_middlewares`], with [`EmptyHandler`] as the terminal step
/// when `handler` is `None`.
#[must_use]
pub fn compose(middlewares: &[BoxedMiddleware], handler: Option<BoxedHandler>) -> BoxedHandler {
    merge_middlewares(middlewares, handler.unwrap_or_else(|| Arc::new(EmptyHandler)))
}

struct BeforeNext {
    handler: BoxedHandler,
    next: BoxedHandler,
}

impl Handler for BeforeNext {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.handler.call(ex).await;
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        self.handler.name()
    }
}

struct AfterNext {
    handler: BoxedHandler,
    next: BoxedHandler,
}

impl Handler for AfterNext {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.next.call(ex).await;
            self.handler.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        self.handler.name()
    }
}

struct HandlerMiddleware {
    handler: BoxedHandler,
    after: bool,
}

impl Middleware for HandlerMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let handler = Arc::clone(&self.handler);
        if self.after {
            Arc::new(AfterNext { handler, next })
        } else {
            Arc::new(BeforeNext { handler, next })
        }
    }

    fn name(&self) -> &'static str {
        self.handler.name()
    }

    fn check_error_before(&self) -> bool {
        self.handler.check_error_before()
    }
}

/// Turns a handler into a middleware that runs it and then calls `next`
/// unconditionally.
#[must_use]
pub fn handler_before_next(handler: BoxedHandler) -> BoxedMiddleware {
    Arc::new(HandlerMiddleware {
        handler,
        after: false,
    })
}

/// Turns a handler into a middleware that calls `next` and then runs it.
#[must_use]
pub fn handler_after_next(handler: BoxedHandler) -> BoxedMiddleware {
    Arc::new(HandlerMiddleware {
        handler,
        after: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::middleware::middleware_fn;
    use bytes::Bytes;
    use pylon_core::StoreManager;

    fn exchange() -> Exchange {
        let mut ex = Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap());
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    fn push(ex: &mut Exchange, step: &'static str) {
        let mut trace = ex.take_value::<Vec<&'static str>>("trace").unwrap_or_default();
        trace.push(step);
        ex.set_value("trace", trace);
    }

    fn trace(ex: &Exchange) -> Vec<&'static str> {
        ex.value::<Vec<&'static str>>("trace").cloned().unwrap_or_default()
    }

    fn step(name: &'static str) -> BoxedHandler {
        Arc::new(
            handler_fn(move |ex| {
                Box::pin(async move {
                    push(ex, name);
                })
            })
            .named(name),
        )
    }

    fn around(name: &'static str) -> BoxedMiddleware {
        Arc::new(
            middleware_fn(move |ex, next| {
                Box::pin(async move {
                    push(ex, name);
                    next.run(ex).await;
                })
            })
            .named(name),
        )
    }

    #[test]
    fn test_merge_handlers_sizes() {
        assert!(merge_handlers(Vec::new()).is_none());

        let single = step("a");
        let merged = merge_handlers(vec![Arc::clone(&single)]).unwrap();
        assert!(Arc::ptr_eq(&single, &merged));
    }

    #[tokio::test]
    async fn test_merge_handlers_runs_in_order() {
        let merged = merge_handlers(vec![step("a"), step("b"), step("c")]).unwrap();
        let mut ex = exchange();
        merged.call(&mut ex).await;
        assert_eq!(trace(&ex), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_merge_middlewares_first_is_outermost() {
        let handler = merge_middlewares(&[around("outer"), around("inner")], step("h"));
        let mut ex = exchange();
        handler.call(&mut ex).await;
        assert_eq!(trace(&ex), ["outer", "inner", "h"]);
    }

    #[tokio::test]
    async fn test_before_and_after_next() {
        let before = handler_before_next(step("before"));
        let after = handler_after_next(step("after"));
        let handler = merge_middlewares(&[before, after], step("h"));

        let mut ex = exchange();
        handler.call(&mut ex).await;
        assert_eq!(trace(&ex), ["before", "h", "after"]);
    }

    #[tokio::test]
    async fn test_compose_without_handler() {
        let handler = compose(&[around("only")], None);
        let mut ex = exchange();
        handler.call(&mut ex).await;
        assert_eq!(trace(&ex), ["only"]);
    }
}
