//! The per-call transport objects handed to every stage.
//!
//! An [`Exchange`] bundles the incoming request, the response being built
//! and the [`CallContext`]. Handlers and middleware take `&mut Exchange`.
//!
//! The envelope conveniences here tolerate a missing envelope (a router
//! built without store initialisation): reads return nothing and writes are
//! dropped with a warning.

use crate::codec::CodecPair;
use crate::context::CallContext;
use crate::envelope::Envelope;
use crate::error::{CoreResult, RecordedError};
use crate::flags::Flags;
use crate::store::HashableKey;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use tracing::warn;

/// The HTTP request type seen by stages. The body is fully buffered.
pub type Request = http::Request<Bytes>;

/// The HTTP response type built by stages.
pub type Response = http::Response<Bytes>;

/// Request, response under construction, and call context.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    response: Response,
    ctx: CallContext,
    responded: bool,
}

impl Exchange {
    /// Creates an exchange with an empty `200 OK` response and a fresh context.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self::with_context(request, CallContext::new())
    }

    /// Creates an exchange around an existing context.
    #[must_use]
    pub fn with_context(request: Request, ctx: CallContext) -> Self {
        Self {
            request,
            response: Response::default(),
            ctx,
            responded: false,
        }
    }

    /// The incoming request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The incoming request, mutably.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response built so far.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// The response built so far, mutably.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// The call context.
    #[must_use]
    pub fn context(&self) -> &CallContext {
        &self.ctx
    }

    /// The call context, mutably.
    pub fn context_mut(&mut self) -> &mut CallContext {
        &mut self.ctx
    }

    /// Splits the exchange into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Request, Response, CallContext) {
        (self.request, self.response, self.ctx)
    }

    /// Consumes the exchange, keeping only the response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }

    /// The request envelope.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        self.ctx.envelope()
    }

    /// The request envelope, mutably.
    pub fn envelope_mut(&mut self) -> Option<&mut Envelope> {
        self.ctx.envelope_mut()
    }

    fn envelope_for_write(&mut self, what: &'static str) -> Option<&mut Envelope> {
        let envelope = self.ctx.envelope_mut();
        if envelope.is_none() {
            warn!(operation = what, "no envelope attached, write dropped");
        }
        envelope
    }

    /// The recorded error.
    #[must_use]
    pub fn error(&self) -> Option<&RecordedError> {
        self.envelope()?.error()
    }

    /// Returns `true` if an error is recorded.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// Records `error` unless one is already recorded.
    pub fn record_error(&mut self, error: impl Into<RecordedError>) -> bool {
        self.envelope_for_write("record_error")
            .is_some_and(|envelope| envelope.record_error(error))
    }

    /// The recorded error detail, or `""`.
    #[must_use]
    pub fn error_detail(&self) -> &str {
        self.envelope().map_or("", Envelope::error_detail)
    }

    /// Records an error detail unless one is already recorded.
    pub fn record_error_detail(&mut self, detail: impl AsRef<str>) -> bool {
        self.envelope_for_write("record_error_detail")
            .is_some_and(|envelope| envelope.record_error_detail(detail))
    }

    /// Clears the recorded error and its detail.
    pub fn clear_error(&mut self) {
        if let Some(envelope) = self.ctx.envelope_mut() {
            envelope.clear_error();
        }
    }

    /// Typed read from the envelope store.
    pub fn value<T: Any>(&self, key: impl HashableKey) -> Option<&T> {
        self.envelope()?.get(key)
    }

    /// Typed write to the envelope store.
    pub fn set_value<T: Any + Send>(&mut self, key: impl HashableKey, value: T) {
        if let Some(envelope) = self.envelope_for_write("set_value") {
            envelope.insert(key, value);
        }
    }

    /// Typed removal from the envelope store.
    pub fn take_value<T: Any>(&mut self, key: impl HashableKey) -> Option<T> {
        self.ctx.envelope_mut()?.take(key)
    }

    /// Returns `true` if `flag` is set on the envelope.
    #[must_use]
    pub fn has_flag(&self, flag: Flags) -> bool {
        self.envelope().is_some_and(|envelope| envelope.has_flag(flag))
    }

    /// Sets or clears `flag` on the envelope.
    pub fn set_flag(&mut self, flag: Flags, on: bool) {
        if let Some(envelope) = self.envelope_for_write("set_flag") {
            envelope.set_flag(flag, on);
        }
    }

    /// The matched route template, or `""`.
    #[must_use]
    pub fn original_path(&self) -> &str {
        self.envelope().map_or("", Envelope::original_path)
    }

    /// The active codec; JSON when no envelope is attached.
    #[must_use]
    pub fn codec(&self) -> CodecPair {
        self.envelope()
            .map_or_else(CodecPair::json, |envelope| envelope.codec().clone())
    }

    /// Returns `true` once a stage has written the response.
    #[must_use]
    pub const fn responded(&self) -> bool {
        self.responded
    }

    /// Writes the response status and body.
    pub fn respond(&mut self, status: StatusCode, body: impl Into<Bytes>) {
        *self.response.status_mut() = status;
        *self.response.body_mut() = body.into();
        self.responded = true;
    }

    /// Writes a `text/plain` response.
    pub fn respond_text(&mut self, status: StatusCode, text: impl Into<String>) {
        self.response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.respond(status, text.into());
    }

    /// Encodes `value` with the active codec and writes it.
    ///
    /// On encoding failure the error is recorded and nothing is written.
    pub fn respond_encoded<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> bool {
        let codec = self.codec();
        match codec.encode(value) {
            Ok(body) => {
                if let Ok(content_type) = HeaderValue::from_str(codec.content_type()) {
                    self.response
                        .headers_mut()
                        .insert(header::CONTENT_TYPE, content_type);
                }
                self.respond(status, body);
                true
            }
            Err(error) => {
                self.record_error(error);
                false
            }
        }
    }

    /// Decodes the request body with the active codec.
    pub fn decode_body<T: DeserializeOwned>(&self) -> CoreResult<T> {
        self.codec().decode(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::StoreManager;
    use serde::Deserialize;

    fn request(body: &'static str) -> Request {
        http::Request::builder()
            .uri("/users")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    fn exchange_with_envelope(body: &'static str) -> Exchange {
        let mut ex = Exchange::new(request(body));
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
    }

    #[test]
    fn test_without_envelope_reads_are_empty_and_writes_dropped() {
        let mut ex = Exchange::new(request(""));
        assert!(!ex.record_error("lost"));
        ex.set_value("k", 1u8);
        ex.set_flag(Flags::NOT_FOUND, true);

        assert!(ex.error().is_none());
        assert_eq!(ex.error_detail(), "");
        assert!(ex.value::<u8>("k").is_none());
        assert!(!ex.has_flag(Flags::NOT_FOUND));
        assert_eq!(ex.original_path(), "");
    }

    #[test]
    fn test_error_helpers_delegate_to_envelope() {
        let mut ex = exchange_with_envelope("");
        assert!(ex.record_error("first"));
        assert!(!ex.record_error("second"));
        assert!(ex.record_error_detail("detail"));
        assert_eq!(ex.error().unwrap().to_string(), "first");
        assert_eq!(ex.error_detail(), "detail");

        ex.clear_error();
        assert!(!ex.has_error());
        assert_eq!(ex.error_detail(), "");
    }

    #[test]
    fn test_respond_encoded_uses_codec() {
        let mut ex = exchange_with_envelope("");
        assert!(ex.respond_encoded(StatusCode::CREATED, &Payload { name: "a".into() }));

        let response = ex.response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(&response.body()[..], br#"{"name":"a"}"#);
        assert!(ex.responded());
    }

    #[test]
    fn test_decode_body() {
        let ex = exchange_with_envelope(r#"{"name":"b"}"#);
        let payload: Payload = ex.decode_body().unwrap();
        assert_eq!(payload.name, "b");

        let bad = exchange_with_envelope("nope");
        assert!(bad.decode_body::<Payload>().is_err());
    }

    #[test]
    fn test_respond_text() {
        let mut ex = Exchange::new(request(""));
        ex.respond_text(StatusCode::NOT_FOUND, "missing");
        assert_eq!(ex.response().status(), StatusCode::NOT_FOUND);
        assert_eq!(&ex.response().body()[..], b"missing");
    }
}
