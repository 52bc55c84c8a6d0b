//! Error types for the conversion client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the generation service
///
/// Malformed event lines are deliberately absent here: a line that looks
/// structured but fails to parse is reclassified as literal generated code
/// inside the classifier instead of failing the session.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (unparseable base URL, bad header, ...)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The HTTP layer failed to establish or maintain the connection
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with a non-success status
    #[error("Service returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    /// A structured event explicitly carried an `error` field
    ///
    /// Fatal: the session is terminal and no partial output is trusted.
    #[error("Generation failed upstream: {0}")]
    Upstream(String),

    /// Failed to decode a response body
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Error::Http {
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else {
            Error::Network(err.to_string())
        }
    }
}
