//! Error gating and the error-handler stage.
//!
//! The [`ErrorGate`] is what the pipeline builder places in front of every
//! item that has not opted out: once an error is recorded in the envelope,
//! the rest of the pipeline is skipped. The [`ErrorHandlerStage`] runs the
//! rest of the pipeline and then reports whatever error was recorded.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::stages::request_id::RequestIdKey;
use http::StatusCode;
use pylon_core::{Exchange, HttpError, RecordedError};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Skips the rest of the pipeline when an error is already recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorGate;

/// The error gate as a shareable middleware.
#[must_use]
pub fn error_gate() -> BoxedMiddleware {
    Arc::new(ErrorGate)
}

struct Gated {
    next: BoxedHandler,
}

impl Handler for Gated {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if ex.has_error() {
                trace!(stage = self.next.name(), "error recorded, skipping");
                return;
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        self.next.name()
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for ErrorGate {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Gated { next })
    }

    fn name(&self) -> &'static str {
        "error_gate"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

/// Callback invoked by [`ErrorHandlerStage`] with the recorded error and
/// its detail text.
pub type ErrorCallback = Arc<dyn Fn(&mut Exchange, &RecordedError, &str) + Send + Sync>;

/// Runs the rest of the pipeline, then hands any recorded error to a
/// callback.
///
/// The stage never gates itself: it must see errors recorded by anything it
/// wraps.
#[derive(Clone)]
pub struct ErrorHandlerStage {
    callback: ErrorCallback,
}

impl ErrorHandlerStage {
    /// Creates the stage with a custom callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&mut Exchange, &RecordedError, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Creates the stage from an already shared callback.
    #[must_use]
    pub fn from_callback(callback: ErrorCallback) -> Self {
        Self { callback }
    }

    /// Creates the stage with [`default_error_callback`].
    #[must_use]
    pub fn with_default() -> Self {
        Self::new(default_error_callback)
    }
}

impl Default for ErrorHandlerStage {
    fn default() -> Self {
        Self::with_default()
    }
}

impl std::fmt::Debug for ErrorHandlerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlerStage").finish_non_exhaustive()
    }
}

struct HandleErrors {
    callback: ErrorCallback,
    next: BoxedHandler,
}

impl Handler for HandleErrors {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.next.call(ex).await;
            let Some(err) = ex.error().cloned() else {
                return;
            };
            let detail = ex.error_detail().to_owned();
            (self.callback)(ex, &err, &detail);
        })
    }

    fn name(&self) -> &'static str {
        "error_handler"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for ErrorHandlerStage {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(HandleErrors {
            callback: Arc::clone(&self.callback),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "error_handler"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

/// Logs the error and, unless a response was already written or the
/// connection was hijacked, writes an error body with the codec.
///
/// The status comes from the error when it is an [`HttpError`], otherwise
/// `500`. Internal errors never expose their message.
pub fn default_error_callback(ex: &mut Exchange, err: &RecordedError, detail: &str) {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, detail, status = status.as_u16(), "request failed");
    } else {
        debug!(error = %err, detail, status = status.as_u16(), "request rejected");
    }

    if ex.responded() || ex.envelope().is_some_and(|envelope| envelope.is_hijacked()) {
        return;
    }

    let request_id = ex.value::<String>(RequestIdKey).cloned();
    let body = match err.as_http() {
        Some(http) => http.to_body(detail, request_id.as_deref()),
        None => HttpError::internal(err.to_string()).to_body(detail, request_id.as_deref()),
    };
    if !ex.respond_encoded(status, &body) {
        ex.respond_text(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use bytes::Bytes;
    use pylon_core::{Flags, StoreManager};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exchange() -> Exchange {
        let mut ex = Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap());
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    fn failing(err: HttpError) -> BoxedHandler {
        let err = RecordedError::from(err);
        Arc::new(handler_fn(move |ex| {
            let err = err.clone();
            Box::pin(async move {
                ex.record_error(err);
            })
        }))
    }

    #[tokio::test]
    async fn test_gate_skips_on_error() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let inner = handler_fn(move |_ex| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        });
        let gated = ErrorGate.wrap(Arc::new(inner));

        let mut ex = exchange();
        gated.call(&mut ex).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        ex.record_error("boom");
        gated.call(&mut ex).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_handler_writes_body() {
        let stage = ErrorHandlerStage::default().wrap(failing(HttpError::not_found("no user")));

        let mut ex = exchange();
        ex.set_value(RequestIdKey, String::from("req-1"));
        stage.call(&mut ex).await;

        assert_eq!(ex.response().status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(ex.response().body()).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "no user");
        assert_eq!(body["request_id"], "req-1");
    }

    #[tokio::test]
    async fn test_error_handler_hides_internal_message() {
        let stage = ErrorHandlerStage::default().wrap(Arc::new(handler_fn(|ex| {
            Box::pin(async move {
                ex.record_error("database password is hunter2");
                ex.record_error_detail("db");
            })
        })));

        let mut ex = exchange();
        stage.call(&mut ex).await;

        assert_eq!(ex.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(ex.response().body()).unwrap();
        assert_eq!(body["error"]["message"], "internal server error");
        assert_eq!(body["error"]["detail"], "db");
    }

    #[tokio::test]
    async fn test_error_handler_respects_written_response_and_hijack() {
        let stage = ErrorHandlerStage::default().wrap(Arc::new(handler_fn(|ex| {
            Box::pin(async move {
                ex.respond_text(StatusCode::ACCEPTED, "partial");
                ex.record_error(HttpError::conflict("late"));
            })
        })));
        let mut ex = exchange();
        stage.call(&mut ex).await;
        assert_eq!(ex.response().status(), StatusCode::ACCEPTED);

        let stage = ErrorHandlerStage::default().wrap(Arc::new(handler_fn(|ex| {
            Box::pin(async move {
                ex.set_flag(Flags::HIJACKED, true);
                ex.record_error("gone");
            })
        })));
        let mut ex = exchange();
        stage.call(&mut ex).await;
        assert!(!ex.responded());
    }

    #[tokio::test]
    async fn test_custom_callback_sees_detail() {
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let stage = ErrorHandlerStage::new(move |_ex, err, detail| {
            *sink.lock().unwrap() = format!("{err}|{detail}");
        })
        .wrap(Arc::new(handler_fn(|ex| {
            Box::pin(async move {
                ex.record_error("bad");
                ex.record_error_detail("why");
            })
        })));

        let mut ex = exchange();
        stage.call(&mut ex).await;
        assert_eq!(*seen.lock().unwrap(), "bad|why");
    }
}
