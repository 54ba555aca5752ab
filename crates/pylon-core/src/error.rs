//! Error types for Pylon.
//!
//! Three kinds of errors live here:
//!
//! - [`RecordedError`]: whatever a handler or middleware attaches to the
//!   request [`Envelope`](crate::Envelope). It travels forward through the
//!   pipeline as data, never as a returned `Err`.
//! - [`HttpError`]: the structured error most handlers record. It knows its
//!   [`ErrorCategory`] and HTTP status and renders to a JSON body.
//! - [`CoreError`]: failures of the core's own fallible operations (codecs).

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the core itself.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A value could not be encoded by the active codec.
    #[error("encode failed: {message}")]
    Encode {
        /// Human-readable error message.
        message: String,
    },

    /// Input could not be decoded by the active codec.
    #[error("decode failed: {message}")]
    Decode {
        /// Human-readable error message.
        message: String,
    },
}

impl CoreError {
    /// Creates an encode error.
    #[must_use]
    pub fn encode(message: impl fmt::Display) -> Self {
        Self::Encode {
            message: message.to_string(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl fmt::Display) -> Self {
        Self::Decode {
            message: message.to_string(),
        }
    }
}

/// Categories of errors for classification and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or invalid input.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Permission denied.
    Forbidden,
    /// No route or resource matched.
    NotFound,
    /// The route exists but not for this method.
    MethodNotAllowed,
    /// Conflicting state.
    Conflict,
    /// Too many requests.
    RateLimited,
    /// The request took too long.
    Timeout,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the machine-readable code used in error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Structured HTTP error.
///
/// # Example
///
/// ```
/// use pylon_core::{ErrorCategory, HttpError};
///
/// let error = HttpError::not_found("no such user");
/// assert_eq!(error.category(), ErrorCategory::NotFound);
/// assert_eq!(error.status_code(), http::StatusCode::NOT_FOUND);
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HttpError {
    category: ErrorCategory,
    status: StatusCode,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl HttpError {
    /// Creates an error of the given category with its default status.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: category.default_status_code(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::BadRequest, message)
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Unauthorized, message)
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Forbidden, message)
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    /// Creates a method not allowed error.
    #[must_use]
    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::MethodNotAllowed, message)
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::RateLimited, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Creates an internal error with an underlying cause.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::internal(message)
        }
    }

    /// Overrides the HTTP status while keeping the category.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Converts this error into a serializable body.
    ///
    /// Internal errors never expose their message to clients.
    #[must_use]
    pub fn to_body(&self, detail: &str, request_id: Option<&str>) -> ErrorBody {
        let message = match self.category {
            ErrorCategory::Internal => "internal server error".to_string(),
            _ => self.message.clone(),
        };
        ErrorBody {
            error: ErrorBodyDetail {
                code: self.category.code().to_string(),
                message,
                category: self.category,
                detail: (!detail.is_empty()).then(|| detail.to_string()),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

/// Serializable error body for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// The error itself.
    pub error: ErrorBodyDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// The `error` object of an [`ErrorBody`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBodyDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Recorded error detail text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An error recorded into a request envelope.
///
/// Cloning is cheap; clones share the same underlying error.
#[derive(Clone)]
pub struct RecordedError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl RecordedError {
    /// Wraps any error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Creates an error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// Wraps an already boxed error.
    #[must_use]
    pub fn from_boxed(error: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self(Arc::from(error))
    }

    /// Wraps an [`anyhow::Error`].
    #[must_use]
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self::from_boxed(error.into())
    }

    /// Returns the wrapped error as `E` if it is one.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns the wrapped [`HttpError`], if that is what was recorded.
    #[must_use]
    pub fn as_http(&self) -> Option<&HttpError> {
        self.downcast_ref::<HttpError>()
    }

    /// Returns the HTTP status this error maps to.
    ///
    /// Errors that are not [`HttpError`]s map to 500.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.as_http()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, HttpError::status_code)
    }

    /// Returns `true` if both handles refer to the same recorded error.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for RecordedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<HttpError> for RecordedError {
    fn from(error: HttpError) -> Self {
        Self::new(error)
    }
}

impl From<CoreError> for RecordedError {
    fn from(error: CoreError) -> Self {
        Self::new(error)
    }
}

impl From<anyhow::Error> for RecordedError {
    fn from(error: anyhow::Error) -> Self {
        Self::from_anyhow(error)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync + 'static>> for RecordedError {
    fn from(error: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        Self::from_boxed(error)
    }
}

impl From<std::io::Error> for RecordedError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}

impl From<String> for RecordedError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for RecordedError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_status_mapping() {
        let categories = [
            ErrorCategory::BadRequest,
            ErrorCategory::Unauthorized,
            ErrorCategory::Forbidden,
            ErrorCategory::NotFound,
            ErrorCategory::MethodNotAllowed,
            ErrorCategory::Conflict,
            ErrorCategory::RateLimited,
            ErrorCategory::Timeout,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }

    #[test]
    fn test_with_status_keeps_category() {
        let error = HttpError::bad_request("too large").with_status(StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error.category(), ErrorCategory::BadRequest);
        assert_eq!(error.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_body_hides_internal_message() {
        let error = HttpError::internal("database password rejected");
        let body = error.to_body("", Some("req-1"));
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert!(!body.error.message.contains("password"));

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"request_id\":\"req-1\""));
        assert!(!json.contains("\"detail\""));
    }

    #[test]
    fn test_body_carries_detail() {
        let body = HttpError::bad_request("invalid id").to_body("id must be numeric", None);
        assert_eq!(body.error.detail.as_deref(), Some("id must be numeric"));
        assert_eq!(body.error.message, "invalid id");
    }

    #[test]
    fn test_recorded_error_downcast_and_status() {
        let recorded = RecordedError::from(HttpError::forbidden("nope"));
        assert_eq!(recorded.status(), StatusCode::FORBIDDEN);
        assert_eq!(recorded.as_http().unwrap().message(), "nope");

        let plain = RecordedError::msg("boom");
        assert_eq!(plain.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(plain.to_string(), "boom");
        assert!(plain.as_http().is_none());
    }

    #[test]
    fn test_recorded_error_clones_share() {
        let recorded = RecordedError::msg("shared");
        let clone = recorded.clone();
        assert!(recorded.ptr_eq(&clone));
        assert!(!recorded.ptr_eq(&RecordedError::msg("shared")));
    }

    #[test]
    fn test_recorded_error_from_anyhow() {
        let recorded = RecordedError::from(anyhow::anyhow!("upstream failed"));
        assert_eq!(recorded.to_string(), "upstream failed");
    }
}
