//! Fixed response headers.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use http::header::{HeaderName, HeaderValue, SERVER};
use http::HeaderMap;
use pylon_core::Exchange;
use std::sync::Arc;

/// Adds a fixed set of headers to every response before the rest of the
/// pipeline runs. Later stages may overwrite them.
#[derive(Debug, Clone, Default)]
pub struct CustomHeaders {
    headers: HeaderMap,
}

impl CustomHeaders {
    /// Creates an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The configured headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Sets the `Server` response header.
///
/// Returns `None` if `name` is not a valid header value.
#[must_use]
pub fn server_name(name: &str) -> Option<CustomHeaders> {
    let value = HeaderValue::from_str(name).ok()?;
    Some(CustomHeaders::new().header(SERVER, value))
}

struct WithHeaders {
    headers: HeaderMap,
    next: BoxedHandler,
}

impl Handler for WithHeaders {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let response = ex.response_mut().headers_mut();
            for (name, value) in &self.headers {
                response.insert(name.clone(), value.clone());
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "custom_headers"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for CustomHeaders {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(WithHeaders {
            headers: self.headers.clone(),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "custom_headers"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}
