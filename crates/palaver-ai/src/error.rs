//! Error types for palaver-ai

use thiserror::Error;

/// Result type alias using palaver-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a reply-generation backend can surface.
///
/// The orchestrator treats all of these as opaque and never retries them.
#[derive(Error, Debug)]
pub enum Error {
    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Request was aborted
    #[error("Request aborted")]
    Aborted,

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A message violates a structural invariant
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::api("server_error", "boom");
        assert_eq!(e.to_string(), "API error: boom (type: server_error)");
        assert_eq!(Error::Aborted.to_string(), "Request aborted");
        assert_eq!(
            Error::InvalidMessage("no id".into()).to_string(),
            "Invalid message: no id"
        );
    }
}
