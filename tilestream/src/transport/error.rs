//! Transport error types.

use thiserror::Error;

/// Errors produced while issuing a request or reading its response.
///
/// [`TransportError::Aborted`] marks a cancellation requested by the owner of
/// the fetch. It is never reported as a failure; use
/// [`is_abort`](TransportError::is_abort) to tell it apart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request could not be sent or the connection failed.
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// The response body stream failed midway.
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// The response was not the expected JSON document.
    #[error("Invalid JSON response: {0}")]
    Json(String),

    /// The request body could not be serialized.
    #[error("Invalid request body: {0}")]
    RequestBody(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// The fetch was aborted by its owner.
    #[error("Request aborted")]
    Aborted,
}

impl TransportError {
    /// Whether this is a user-initiated abort rather than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_distinguished() {
        assert!(TransportError::Aborted.is_abort());
        assert!(!TransportError::Body("eof".into()).is_abort());
        assert!(!TransportError::Http {
            status: 500,
            url: "http://localhost/tiles".into()
        }
        .is_abort());
    }

    #[test]
    fn test_display() {
        let err = TransportError::Http {
            status: 404,
            url: "http://localhost/sources".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from http://localhost/sources");
    }
}
