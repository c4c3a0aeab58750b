//! Token-bucket rate limiting for outbound provider calls.
//!
//! The bucket is refilled lazily: every consume or estimate call first
//! credits the tokens accrued since the last refill. Balances are kept in
//! micro-tokens so refill is exact integer arithmetic; at a refill rate of
//! `r` tokens per second, one elapsed microsecond is worth `r` micro-tokens.
//!
//! All time readings use [`tokio::time::Instant`] so tests can drive the
//! bucket with a paused clock.

use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MICROS_PER_TOKEN: u64 = 1_000_000;

/// Shortest sleep between attempts in [`TokenBucket::wait_and_consume`].
pub const MIN_WAIT_STEP: Duration = Duration::from_millis(50);

/// Longest sleep between attempts in [`TokenBucket::wait_and_consume`].
pub const MAX_WAIT_STEP: Duration = Duration::from_secs(1);

/// Default bucket capacity.
pub const DEFAULT_CAPACITY: NonZeroU32 = NonZeroU32::MIN.saturating_add(19);

/// Default refill rate in tokens per second.
pub const DEFAULT_REFILL_PER_SECOND: NonZeroU32 = NonZeroU32::MIN;

/// Errors returned while waiting for tokens.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LimiterError {
    /// The waiter was cancelled before tokens became available.
    #[error("rate limiter wait cancelled")]
    Cancelled,

    /// The requested cost can never be satisfied by this bucket.
    #[error("request cost {cost} exceeds bucket capacity {capacity}")]
    CostExceedsCapacity {
        /// Requested cost.
        cost: u32,
        /// Bucket capacity.
        capacity: u32,
    },
}

/// Classes of outbound request and their token cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Viewer identity lookup.
    Whoami,
    /// Notification listing and notification detail lookups.
    Notifications,
    /// Involvement searches and their detail lookups.
    UserQuery,
    /// Favorite repository searches and their detail lookups.
    FavoriteRepo,
}

impl RequestKind {
    /// Every request kind.
    pub const ALL: [Self; 4] = [
        Self::Whoami,
        Self::Notifications,
        Self::UserQuery,
        Self::FavoriteRepo,
    ];

    /// Largest cost of any request kind. A bucket smaller than this can
    /// never pay for every request the worker makes.
    #[must_use]
    pub fn max_cost() -> u32 {
        Self::ALL
            .into_iter()
            .map(Self::cost)
            .max()
            .unwrap_or_default()
    }

    /// Token cost charged for one request of this kind.
    #[must_use]
    pub const fn cost(self) -> u32 {
        match self {
            Self::Whoami => 1,
            Self::Notifications => 2,
            Self::UserQuery | Self::FavoriteRepo => 4,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    micro_tokens: u64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
///
/// # Example
///
/// ```
/// use std::num::NonZeroU32;
///
/// use pr_radar::limiter::TokenBucket;
///
/// let capacity = NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN);
/// let bucket = TokenBucket::new(capacity, NonZeroU32::MIN, 5);
/// assert!(bucket.try_consume(3));
/// assert!(!bucket.try_consume(3));
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    capacity: NonZeroU32,
    refill_per_second: NonZeroU32,
    state: Mutex<BucketState>,
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_PER_SECOND, 0)
    }
}

impl TokenBucket {
    /// Creates a bucket. `initial_tokens` is clamped to `capacity`.
    #[must_use]
    pub fn new(capacity: NonZeroU32, refill_per_second: NonZeroU32, initial_tokens: u32) -> Self {
        let initial = initial_tokens.min(capacity.get());
        Self {
            capacity,
            refill_per_second,
            state: Mutex::new(BucketState {
                micro_tokens: to_micro(initial),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Maximum number of tokens the bucket can hold.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity.get()
    }

    /// Tokens credited per second.
    #[must_use]
    pub const fn refill_per_second(&self) -> u32 {
        self.refill_per_second.get()
    }

    /// Attempts to deduct `cost` tokens without waiting.
    #[must_use]
    pub fn try_consume(&self, cost: u32) -> bool {
        self.try_consume_at(cost, Instant::now())
    }

    /// Attempts to deduct `cost` tokens as of `now`.
    #[must_use]
    pub fn try_consume_at(&self, cost: u32, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);
        Self::take(&mut state, cost)
    }

    /// Advisory time until `cost` tokens would be available.
    #[must_use]
    pub fn estimate_wait(&self, cost: u32) -> Duration {
        self.estimate_wait_at(cost, Instant::now())
    }

    /// Advisory time until `cost` tokens would be available, as of `now`.
    #[must_use]
    pub fn estimate_wait_at(&self, cost: u32, now: Instant) -> Duration {
        let mut state = self.lock();
        self.refill(&mut state, now);
        self.wait_for_deficit(&state, cost)
    }

    /// Whole tokens available as of `now`.
    #[must_use]
    pub fn available_tokens_at(&self, now: Instant) -> u32 {
        let mut state = self.lock();
        self.refill(&mut state, now);
        let whole = state
            .micro_tokens
            .checked_div(MICROS_PER_TOKEN)
            .unwrap_or_default();
        u32::try_from(whole).unwrap_or(u32::MAX)
    }

    /// Suspends until `cost` tokens can be deducted, then deducts them.
    ///
    /// Each attempt sleeps for the estimated wait clamped to
    /// [`MIN_WAIT_STEP`]..=[`MAX_WAIT_STEP`], racing the sleep against
    /// `cancel`. A cancelled waiter consumes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::CostExceedsCapacity`] immediately when `cost`
    /// is larger than the capacity, and [`LimiterError::Cancelled`] when
    /// `cancel` fires first.
    pub async fn wait_and_consume(
        &self,
        cost: u32,
        cancel: &CancellationToken,
    ) -> Result<(), LimiterError> {
        if cost > self.capacity.get() {
            return Err(LimiterError::CostExceedsCapacity {
                cost,
                capacity: self.capacity.get(),
            });
        }

        loop {
            if cancel.is_cancelled() {
                return Err(LimiterError::Cancelled);
            }

            let wait = {
                let mut state = self.lock();
                self.refill(&mut state, Instant::now());
                if Self::take(&mut state, cost) {
                    return Ok(());
                }
                self.wait_for_deficit(&state, cost)
            };

            let step = wait.clamp(MIN_WAIT_STEP, MAX_WAIT_STEP);
            debug!(cost, wait_ms = step.as_millis(), "waiting for rate limiter tokens");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LimiterError::Cancelled),
                () = tokio::time::sleep(step) => {}
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let elapsed_micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        if elapsed_micros == 0 {
            return;
        }

        let ceiling = to_micro(self.capacity.get());
        let gained = elapsed_micros.saturating_mul(u64::from(self.refill_per_second.get()));
        let refilled = state.micro_tokens.saturating_add(gained);
        if refilled >= ceiling {
            state.micro_tokens = ceiling;
            state.last_refill = now;
        } else {
            state.micro_tokens = refilled;
            state.last_refill += Duration::from_micros(elapsed_micros);
        }
    }

    fn take(state: &mut BucketState, cost: u32) -> bool {
        let needed = to_micro(cost);
        if state.micro_tokens >= needed {
            state.micro_tokens = state.micro_tokens.saturating_sub(needed);
            true
        } else {
            false
        }
    }

    fn wait_for_deficit(&self, state: &BucketState, cost: u32) -> Duration {
        let deficit = to_micro(cost).saturating_sub(state.micro_tokens);
        if deficit == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(deficit.div_ceil(u64::from(self.refill_per_second.get())))
    }
}

fn to_micro(tokens: u32) -> u64 {
    u64::from(tokens).saturating_mul(MICROS_PER_TOKEN)
}
