//! Rate limit information reported by GitHub.
//!
//! When GitHub rejects a request for exceeding its quota, the gateway asks
//! the `/rate_limit` endpoint when the window resets. The worker turns that
//! reset time into the cooldown it announces to subscribers.

use std::time::Duration;

/// Quota snapshot for the core GitHub API window.
///
/// # Example
///
/// ```
/// use pr_radar::github::rate_limit::RateLimitInfo;
///
/// use std::time::Duration;
///
/// let info = RateLimitInfo::new(5000, 0, 1_700_000_060);
/// assert_eq!(info.remaining(), 0);
/// assert_eq!(
///     info.retry_after_from(1_700_000_000),
///     Some(Duration::from_secs(60))
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    limit: u32,
    remaining: u32,
    reset_at: u64,
}

impl RateLimitInfo {
    /// Creates a new rate limit info instance.
    #[must_use]
    pub const fn new(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self {
            limit,
            remaining,
            reset_at,
        }
    }

    /// Maximum requests allowed in the current window.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Requests left in the current window.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Unix timestamp (seconds) at which the window resets.
    #[must_use]
    pub const fn reset_at(&self) -> u64 {
        self.reset_at
    }

    /// Time left until the window resets, measured from `now_unix`.
    ///
    /// Returns `None` once the reset time has passed, leaving the caller to
    /// pick its own conservative default.
    #[must_use]
    pub const fn retry_after_from(&self, now_unix: u64) -> Option<Duration> {
        match self.reset_at.checked_sub(now_unix) {
            Some(0) | None => None,
            Some(seconds) => Some(Duration::from_secs(seconds)),
        }
    }
}
