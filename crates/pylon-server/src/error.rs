//! Server error types.

use std::net::SocketAddr;

use pylon_middleware::PipelineError;
use thiserror::Error;

/// Errors raised while assembling routes or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The bind address could not be parsed.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// Binding the listener failed.
    #[error("failed to bind to {addr}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A route template was rejected by the path matcher.
    #[error("invalid route '{path}': {reason}")]
    InvalidRoute {
        /// The route template.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A pipeline could not be built.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create an invalid route error.
    pub fn invalid_route(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidRoute {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::InvalidAddress {
            addr: "nowhere".to_string(),
            reason: "invalid socket address syntax".to_string(),
        };
        assert!(err.to_string().starts_with("invalid address 'nowhere'"));

        let err = ServerError::invalid_route("/users/{id", "unclosed brace");
        assert_eq!(err.to_string(), "invalid route '/users/{id': unclosed brace");
    }

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err = ServerError::from(PipelineError::UnclassifiedComponent { index: 2 });
        assert!(err.to_string().contains("position 2"));
    }
}
