//! Errors raised while following the event stream.

use thiserror::Error;

/// Failures of the streaming client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The stream URL could not be built.
    #[error("invalid stream URL: {message}")]
    InvalidUrl {
        /// Parser message.
        message: String,
    },

    /// The HTTP client could not be configured.
    #[error("failed to configure HTTP client: {message}")]
    Configuration {
        /// Underlying error message.
        message: String,
    },

    /// The request failed or the connection dropped.
    #[error("connection failed: {message}")]
    Connection {
        /// Underlying error message.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("server returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// An event payload could not be decoded.
    #[error("failed to decode {kind} event: {message}")]
    Decode {
        /// SSE event name, or `message` when unnamed.
        kind: String,
        /// Decoder message.
        message: String,
    },
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        error.status().map_or_else(
            || Self::Connection {
                message: error.to_string(),
            },
            |status| Self::Status {
                status: status.as_u16(),
            },
        )
    }
}

impl From<url::ParseError> for ClientError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidUrl {
            message: error.to_string(),
        }
    }
}
