//! Error types exposed by the pull request data source layer.

use thiserror::Error;

use super::rate_limit::RateLimitInfo;
use crate::limiter::LimiterError;

/// Phrases the search provider uses when a repository qualifier names a
/// repository that does not exist or that the viewer cannot read.
const INACCESSIBLE_REPOSITORY_PHRASES: [&str; 3] = [
    "cannot be searched",
    "do not have permission",
    "invalid search query",
];

/// Phrase that marks an error as a rate-limit refusal.
///
/// This also matches GitHub's "secondary rate limit" and "API rate limit
/// exceeded" wording, and any other message that merely mentions a rate
/// limit.
const RATE_LIMIT_PHRASE: &str = "rate limit";

/// Errors surfaced while querying GitHub for pull requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The API backend was selected but no token was configured.
    #[error("personal access token is required for the API backend")]
    MissingToken,

    /// The token was rejected by GitHub.
    #[error("GitHub rejected the token: {message}")]
    Authentication {
        /// GitHub error message returned with the 401/403 response.
        message: String,
    },

    /// GitHub returned a non-authentication API error.
    #[error("GitHub API error: {message}")]
    Api {
        /// Response body from GitHub describing the failure.
        message: String,
    },

    /// Networking failed while calling GitHub.
    #[error("network error talking to GitHub: {message}")]
    Network {
        /// Transport-level error detail.
        message: String,
    },

    /// GitHub refused the request because a rate limit was exceeded.
    #[error("GitHub API rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// Rate limit info if it could be retrieved.
        rate_limit: Option<RateLimitInfo>,
        /// Error message from GitHub.
        message: String,
    },

    /// A `gh` invocation exited unsuccessfully.
    #[error("`{command}` failed: {message}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Captured standard error, or the exit status when stderr was empty.
        message: String,
    },

    /// A `gh` invocation did not finish within the configured timeout.
    #[error("`{command}` timed out after {timeout_secs}s")]
    CommandTimedOut {
        /// The command line that was run.
        command: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// A response could not be decoded into the expected shape.
    #[error("malformed response from {operation}: {message}")]
    Decode {
        /// Operation whose response failed to decode.
        operation: String,
        /// Decoder error detail.
        message: String,
    },

    /// Local I/O failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },

    /// Configuration was missing or inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// The operation was abandoned because the worker is stopping.
    #[error("operation cancelled")]
    Cancelled,
}

impl SourceError {
    /// Returns true when the provider reported that a repository cannot be
    /// searched by the current viewer.
    ///
    /// Favorite repositories failing this way are skipped for the cycle
    /// instead of aborting it.
    #[must_use]
    pub fn is_inaccessible_repository(&self) -> bool {
        let text = self.to_string().to_lowercase();
        INACCESSIBLE_REPOSITORY_PHRASES
            .iter()
            .any(|phrase| text.contains(phrase))
    }

    /// Returns true for structured rate-limit errors and for any error
    /// whose text mentions a rate limit.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
            || self.to_string().to_lowercase().contains(RATE_LIMIT_PHRASE)
    }

    /// Returns true when the error must abort the whole poll cycle rather
    /// than degrade a single record or skip a single repository.
    #[must_use]
    pub fn aborts_cycle(&self) -> bool {
        matches!(self, Self::Cancelled) || self.is_rate_limited()
    }

    pub(crate) fn decode(operation: &str, error: &serde_json::Error) -> Self {
        Self::Decode {
            operation: operation.to_owned(),
            message: error.to_string(),
        }
    }
}

impl From<LimiterError> for SourceError {
    fn from(error: LimiterError) -> Self {
        match error {
            LimiterError::Cancelled => Self::Cancelled,
            LimiterError::CostExceedsCapacity { .. } => Self::Configuration {
                message: error.to_string(),
            },
        }
    }
}
