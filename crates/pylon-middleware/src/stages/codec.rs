//! Per-route codec override.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use pylon_core::{CodecPair, Exchange};
use std::sync::Arc;

/// Installs a codec on the envelope for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct UseCodec {
    codec: CodecPair,
}

impl UseCodec {
    /// Creates the stage.
    #[must_use]
    pub fn new(codec: CodecPair) -> Self {
        Self { codec }
    }
}

struct Coded {
    codec: CodecPair,
    next: BoxedHandler,
}

impl Handler for Coded {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(envelope) = ex.envelope_mut() {
                envelope.set_codec(self.codec.clone());
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "use_codec"
    }
}

impl Middleware for UseCodec {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Coded {
            codec: self.codec.clone(),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "use_codec"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use bytes::Bytes;
    use http::{header, StatusCode};
    use pylon_core::{JsonCodec, StoreManager};

    #[tokio::test]
    async fn test_route_codec_used_for_responses() {
        let pretty = CodecPair::new(JsonCodec::pretty(), JsonCodec::new());
        let inner = handler_fn(|ex| {
            Box::pin(async move {
                ex.respond_encoded(StatusCode::OK, &serde_json::json!({"a": 1}));
            })
        });

        let mut ex = Exchange::new(http::Request::builder().uri("/").body(Bytes::new()).unwrap());
        StoreManager::default().acquire(ex.context_mut());
        UseCodec::new(pretty).wrap(Arc::new(inner)).call(&mut ex).await;

        assert_eq!(ex.response().headers()[header::CONTENT_TYPE], "application/json");
        assert!(ex.response().body().contains(&b'\n'));
    }
}
