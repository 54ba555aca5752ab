//! Trailing-slash normalisation.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use http::uri::{PathAndQuery, Uri};
use http::{header, HeaderValue, StatusCode};
use pylon_core::Exchange;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// What to do with a request path that ends in `/`.
///
/// The root path `/` is never touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingSlash {
    /// Leave paths alone.
    #[default]
    Keep,
    /// Rewrite the request path without the slash and continue.
    Strip,
    /// Answer `308 Permanent Redirect` to the path without the slash.
    Redirect,
}

fn trimmed(path: &str) -> Option<&str> {
    if path.len() > 1 && path.ends_with('/') {
        let cut = path.trim_end_matches('/');
        Some(if cut.is_empty() { "/" } else { cut })
    } else {
        None
    }
}

fn rebuild(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}

struct Normalised {
    mode: TrailingSlash,
    next: BoxedHandler,
}

impl Handler for Normalised {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let uri = ex.request().uri();
            let target = trimmed(uri.path()).and_then(|path| rebuild(uri, path));

            match (self.mode, target) {
                (TrailingSlash::Strip, Some(target)) => {
                    trace!(to = %target, "stripping trailing slash");
                    *ex.request_mut().uri_mut() = target;
                }
                (TrailingSlash::Redirect, Some(target)) => {
                    let location = target
                        .path_and_query()
                        .map_or_else(|| target.path().to_string(), ToString::to_string);
                    if let Ok(value) = HeaderValue::from_str(&location) {
                        ex.response_mut().headers_mut().insert(header::LOCATION, value);
                        ex.respond(StatusCode::PERMANENT_REDIRECT, bytes::Bytes::new());
                        return;
                    }
                }
                _ => {}
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "trailing_slash"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for TrailingSlash {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        if *self == Self::Keep {
            return next;
        }
        Arc::new(Normalised { mode: *self, next })
    }

    fn name(&self) -> &'static str {
        "trailing_slash"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}
