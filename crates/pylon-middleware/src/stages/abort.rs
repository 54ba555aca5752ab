//! Stages that stop the pipeline with an error.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use pylon_core::{Exchange, RecordedError};
use std::sync::Arc;

/// Records a fixed error and never calls `next`.
///
/// Created by [`abort_with`]. Not gated: it records even when an earlier
/// error exists, which leaves the first error in place.
#[derive(Debug, Clone)]
pub struct AbortWith {
    error: RecordedError,
}

/// Creates a stage that records `error` and stops the pipeline.
pub fn abort_with(error: impl Into<RecordedError>) -> AbortWith {
    AbortWith {
        error: error.into(),
    }
}

struct Aborting {
    error: RecordedError,
}

impl Handler for Aborting {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            ex.record_error(self.error.clone());
        })
    }

    fn name(&self) -> &'static str {
        "abort_with"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for AbortWith {
    fn wrap(&self, _next: BoxedHandler) -> BoxedHandler {
        Arc::new(Aborting {
            error: self.error.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "abort_with"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

type Predicate = Arc<dyn Fn(&Exchange) -> bool + Send + Sync>;

/// Records an error and stops when a predicate matches the exchange;
/// otherwise calls `next`.
///
/// Created by [`abort_if`].
#[derive(Clone)]
pub struct AbortIf {
    predicate: Predicate,
    error: RecordedError,
}

/// Creates a stage that aborts with `error` whenever `predicate` holds.
///
/// ```
/// use pylon_core::HttpError;
/// use pylon_middleware::stages::abort_if;
///
/// let require_json = abort_if(
///     |ex| !ex.request().headers().contains_key(http::header::CONTENT_TYPE),
///     HttpError::bad_request("content-type required"),
/// );
/// # let _ = require_json;
/// ```
pub fn abort_if<F>(predicate: F, error: impl Into<RecordedError>) -> AbortIf
where
    F: Fn(&Exchange) -> bool + Send + Sync + 'static,
{
    AbortIf {
        predicate: Arc::new(predicate),
        error: error.into(),
    }
}

impl std::fmt::Debug for AbortIf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortIf")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

struct Guarded {
    predicate: Predicate,
    error: RecordedError,
    next: BoxedHandler,
}

impl Handler for Guarded {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if (self.predicate)(ex) {
                ex.record_error(self.error.clone());
                return;
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "abort_if"
    }
}

impl Middleware for AbortIf {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Guarded {
            predicate: Arc::clone(&self.predicate),
            error: self.error.clone(),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "abort_if"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use bytes::Bytes;
    use http::StatusCode;
    use pylon_core::{HttpError, StoreManager};

    fn exchange(uri: &str) -> Exchange {
        let mut ex = Exchange::new(http::Request::builder().uri(uri).body(Bytes::new()).unwrap());
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    fn reached() -> BoxedHandler {
        Arc::new(handler_fn(|ex| {
            Box::pin(async move {
                ex.respond_text(StatusCode::OK, "reached");
            })
        }))
    }

    #[tokio::test]
    async fn test_abort_with_stops() {
        let stage = abort_with(HttpError::forbidden("closed")).wrap(reached());
        let mut ex = exchange("/");
        stage.call(&mut ex).await;

        assert!(!ex.responded());
        assert_eq!(ex.error().unwrap().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_abort_with_keeps_first_error() {
        let stage = abort_with("second").wrap(reached());
        let mut ex = exchange("/");
        ex.record_error("first");
        stage.call(&mut ex).await;
        assert_eq!(ex.error().unwrap().to_string(), "first");
    }

    #[tokio::test]
    async fn test_abort_if() {
        let stage = abort_if(
            |ex| ex.request().uri().path() == "/admin",
            HttpError::unauthorized("login"),
        )
        .wrap(reached());

        let mut blocked = exchange("/admin");
        stage.call(&mut blocked).await;
        assert_eq!(blocked.error().unwrap().status(), StatusCode::UNAUTHORIZED);

        let mut open = exchange("/public");
        stage.call(&mut open).await;
        assert!(open.responded());
        assert!(!open.has_error());
    }
}
