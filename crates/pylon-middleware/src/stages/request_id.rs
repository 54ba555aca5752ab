//! Request ID stage.
//!
//! Every request gets an identifier, stored in the envelope under
//! [`RequestIdKey`] and echoed in the `X-Request-ID` response header so
//! clients can correlate their calls with server logs.
//!
//! ## Request ID Sources
//!
//! 1. **X-Request-ID header**: used as-is when incoming IDs are trusted
//! 2. **Generated UUID v7**: otherwise, or when the header is missing or unusable
//!
//! The error handler reads the stored ID when it writes an error body.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use http::HeaderValue;
use pylon_core::{Exchange, RequestId};
use std::sync::Arc;
use tracing::trace;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest incoming request ID that is accepted.
const MAX_INCOMING_LEN: usize = 128;

pylon_core::marker_key! {
    /// Envelope key under which the request ID is stored as a `String`.
    pub struct RequestIdKey;
}

/// Middleware that forwards or generates request IDs.
///
/// ```
/// use pylon_middleware::stages::RequestIdMiddleware;
///
/// let internal = RequestIdMiddleware::trust_incoming();
/// # let _ = internal;
/// ```
#[derive(Clone, Default)]
pub struct RequestIdMiddleware {
    trust_incoming: bool,
    fallback: Option<Generator>,
}

type Generator = Arc<dyn Fn() -> String + Send + Sync>;

impl std::fmt::Debug for RequestIdMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestIdMiddleware")
            .field("trust_incoming", &self.trust_incoming)
            .field("custom_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl RequestIdMiddleware {
    /// Creates the stage. Incoming IDs are ignored and a new one is always
    /// generated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that forwards incoming `X-Request-ID` values.
    ///
    /// Use this behind a proxy or for service-to-service traffic where the
    /// caller already assigned an ID.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
            fallback: None,
        }
    }

    /// Uses `generate` instead of UUID v7 when no usable ID is forwarded.
    #[must_use]
    pub fn with_fallback<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(generate));
        self
    }

    fn generate(&self) -> String {
        match &self.fallback {
            Some(generate) => generate(),
            None => RequestId::new().to_string(),
        }
    }

    fn incoming(&self, ex: &Exchange) -> Option<String> {
        if !self.trust_incoming {
            return None;
        }
        ex.request()
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_INCOMING_LEN)
            .map(ToString::to_string)
    }
}

struct Forwarding {
    stage: RequestIdMiddleware,
    next: BoxedHandler,
}

impl Handler for Forwarding {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let request_id = self
                .stage
                .incoming(ex)
                .unwrap_or_else(|| self.stage.generate());
            trace!(request_id = %request_id, "request id assigned");

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                ex.response_mut().headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            ex.set_value(RequestIdKey, request_id);

            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "request_id"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for RequestIdMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Forwarding {
            stage: self.clone(),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "request_id"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}
