//! Failure classification for the poll loop.
//!
//! Rate-limit detection is kept in one function so the loop never inspects
//! error text itself.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::github::error::SourceError;

/// How the loop should react to a failed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Pause polling for `retry_after`.
    RateLimited {
        /// Cooldown before the next cycle.
        retry_after: Duration,
        /// Message reported to subscribers.
        message: String,
    },
    /// Retry after the error backoff.
    Transient {
        /// Message reported to subscribers.
        message: String,
    },
}

/// Classifies `error` using the system clock.
///
/// See [`classify_failure_at`].
#[must_use]
pub fn classify_failure(error: &SourceError, default_cooldown: Duration) -> Failure {
    let now_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    classify_failure_at(error, default_cooldown, now_unix)
}

/// Classifies `error` as of `now_unix` seconds.
///
/// Structured rate-limit errors use the provider's reset time when it is
/// known and still in the future. Any other error whose text mentions a rate
/// limit gets `default_cooldown`. Everything else is transient.
#[must_use]
pub fn classify_failure_at(error: &SourceError, default_cooldown: Duration, now_unix: u64) -> Failure {
    match error {
        SourceError::RateLimitExceeded {
            rate_limit,
            message,
        } => Failure::RateLimited {
            retry_after: rate_limit
                .and_then(|info| info.retry_after_from(now_unix))
                .unwrap_or(default_cooldown),
            message: message.clone(),
        },
        other if other.is_rate_limited() => Failure::RateLimited {
            retry_after: default_cooldown,
            message: other.to_string(),
        },
        other => Failure::Transient {
            message: other.to_string(),
        },
    }
}
