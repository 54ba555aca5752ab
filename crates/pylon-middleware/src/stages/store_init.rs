//! Envelope lifecycle stage.
//!
//! [`StoreInit`] scopes one request: it derives a child cancellation signal,
//! acquires an envelope from the [`StoreManager`], runs the rest of the
//! pipeline, then releases the envelope and cancels the scope. An envelope
//! transferred by a downstream stage is left alone on release.
//!
//! Scopes nest: a sub-pipeline with its own `StoreInit` works on a fresh
//! envelope, and the enclosing one comes back unchanged when it returns.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use pylon_core::{CancelOnDrop, Exchange, StoreManager};
use std::sync::Arc;
use tracing::trace;

/// Acquires the request envelope before the rest of the pipeline and
/// releases it afterwards.
#[derive(Debug, Clone)]
pub struct StoreInit {
    manager: Arc<StoreManager>,
}

impl StoreInit {
    /// Creates the stage around a shared manager.
    #[must_use]
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }

    /// The manager envelopes are drawn from.
    #[must_use]
    pub fn manager(&self) -> &Arc<StoreManager> {
        &self.manager
    }
}

impl Default for StoreInit {
    fn default() -> Self {
        Self::new(Arc::new(StoreManager::default()))
    }
}

struct Scoped {
    manager: Arc<StoreManager>,
    next: BoxedHandler,
}

impl Handler for Scoped {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let scope = ex.context().cancel_signal().child();
            let parent = ex.context_mut().replace_cancel_signal(scope.clone());
            let guard = CancelOnDrop::new(scope);

            let envelopes = self.manager.enter(ex.context_mut());
            trace!(nested = envelopes.is_nested(), "envelope acquired");

            self.next.call(ex).await;

            self.manager.leave(ex.context_mut(), envelopes);
            ex.context_mut().replace_cancel_signal(parent);
            drop(guard);
        })
    }

    fn name(&self) -> &'static str {
        "store_init"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for StoreInit {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Scoped {
            manager: Arc::clone(&self.manager),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "store_init"
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
    use pylon_core::CancelSignal;

    fn exchange() -> Exchange {
        Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn test_envelope_available_inside_and_released_after() {
        let stage = StoreInit::default();
        let manager = Arc::clone(stage.manager());
        let inner = handler_fn(|ex| {
            Box::pin(async move {
                assert!(ex.envelope().is_some());
                ex.set_value("seen", true);
            })
        });

        let mut ex = exchange();
        stage.wrap(Arc::new(inner)).call(&mut ex).await;

        assert!(ex.envelope().is_none());
        assert_eq!(manager.stats().allocated, manager.stats().idle);
    }

    #[tokio::test]
    async fn test_scope_cancelled_but_parent_survives() {
        let root = CancelSignal::new();
        let captured = Arc::new(parking_lot::Mutex::new(None::<CancelSignal>));
        let slot = Arc::clone(&captured);
        let inner = handler_fn(move |ex| {
            *slot.lock() = Some(ex.context().cancel_signal().clone());
            Box::pin(async {})
        });

        let mut ex = Exchange::with_context(
            http::Request::builder().uri("/").body(Bytes::new()).unwrap(),
            pylon_core::CallContext::with_cancel(root.clone()),
        );
        StoreInit::default().wrap(Arc::new(inner)).call(&mut ex).await;

        let scope = captured.lock().take().unwrap();
        assert!(scope.is_cancelled());
        assert!(!root.is_cancelled());
        assert!(!ex.context().is_cancelled());
    }

    #[tokio::test]
    async fn test_nested_store_init_keeps_enclosing_envelope() {
        let manager = Arc::new(StoreManager::default());
        let seen = Arc::new(parking_lot::Mutex::new(None::<bool>));
        let slot = Arc::clone(&seen);
        let inner = handler_fn(move |ex| {
            *slot.lock() = Some(ex.value::<u32>("parent").is_none() && !ex.has_error());
            ex.set_value("child", 2u32);
            Box::pin(async {})
        });
        let sub = StoreInit::new(Arc::clone(&manager)).wrap(Arc::new(inner));

        let mut ex = exchange();
        manager.acquire(ex.context_mut());
        ex.set_value("parent", 1u32);
        ex.record_error("parent failed");

        sub.call(&mut ex).await;

        assert!(ex.context().has_envelope());
        assert_eq!(ex.value::<u32>("parent"), Some(&1));
        assert_eq!(*seen.lock(), Some(true));
        assert!(ex.value::<u32>("child").is_none());
        assert_eq!(ex.error().map(ToString::to_string).as_deref(), Some("parent failed"));

        manager.release(ex.context_mut());
        assert_eq!(manager.stats().allocated, manager.stats().idle);
    }

    #[tokio::test]
    async fn test_transferred_envelope_not_recycled() {
        let stage = StoreInit::default();
        let manager = Arc::clone(stage.manager());
        let keep = Arc::clone(&manager);
        let stash = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&stash);
        let inner = handler_fn(move |ex| {
            ex.set_value("user", 7u32);
            *sink.lock() = keep.transfer(ex.context_mut());
            Box::pin(async {})
        });

        let mut ex = exchange();
        stage.wrap(Arc::new(inner)).call(&mut ex).await;

        let owned = stash.lock().take().unwrap();
        assert_eq!(owned.get::<u32>("user"), Some(&7));
        assert_eq!(manager.stats().transferred, 1);
    }
}
