//! Panic recovery.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use futures_util::FutureExt;
use pylon_core::{Exchange, HttpError};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Catches a panic in the rest of the pipeline and records it as an
/// internal error.
///
/// Place it inside [`StoreInit`](super::StoreInit) so there is an envelope
/// to record into, and inside the error handler so the error gets reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

struct Recovering {
    next: BoxedHandler,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

impl Handler for Recovering {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            // Building the downstream future can panic too, so it happens
            // inside the guarded block.
            let outcome = AssertUnwindSafe(async { self.next.call(ex).await })
                .catch_unwind()
                .await;
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                error!(panic = message, "panic recovered");
                ex.record_error(HttpError::internal(format!("panic recovered: {message}")));
            }
        })
    }

    fn name(&self) -> &'static str {
        "recover"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for Recover {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Recovering { next })
    }

    fn name(&self) -> &'static str {
        "recover"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use bytes::Bytes;
    use pylon_core::StoreManager;

    fn exchange() -> Exchange {
        let mut ex = Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap());
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let panicking = handler_fn(|_ex| {
            Box::pin(async {
                panic!("handler exploded");
            })
        });
        let mut ex = exchange();
        Recover.wrap(Arc::new(panicking)).call(&mut ex).await;

        let err = ex.error().unwrap();
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_panic_before_future_is_built() {
        let eager = handler_fn(|_ex| {
            let empty: Vec<u8> = Vec::new();
            let _ = empty[3];
            Box::pin(async {})
        });
        let mut ex = exchange();
        Recover.wrap(Arc::new(eager)).call(&mut ex).await;

        let err = ex.error().unwrap();
        assert_eq!(err.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_panic_in_middleware_closure() {
        let eager = crate::middleware::middleware_fn(|_ex, _next| {
            panic!("middleware exploded");
        });
        let inner = eager.wrap(Arc::new(handler_fn(|_ex| Box::pin(async {}))));
        let mut ex = exchange();
        Recover.wrap(inner).call(&mut ex).await;

        assert!(ex.error().unwrap().to_string().contains("middleware exploded"));
    }

    #[tokio::test]
    async fn test_no_panic_no_error() {
        let quiet = handler_fn(|_ex| Box::pin(async {}));
        let mut ex = exchange();
        Recover.wrap(Arc::new(quiet)).call(&mut ex).await;
        assert!(!ex.has_error());
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let fixed: Box<dyn Any + Send> = Box::new("fixed");
        let other: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(fixed.as_ref()), "fixed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
