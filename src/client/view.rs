//! Pure reducer that folds worker events into a renderable view.
//!
//! [`ClientView`] never reads a clock. Every event carries the caller's
//! receipt time and every derived value takes `now` explicitly, so the
//! reducer can be replayed deterministically.

use std::collections::BTreeMap;

use crate::github::models::PullRequestRecord;
use crate::worker::{WorkerEvent, WorkerStatus};

/// Snapshot age beyond which the view is stale, in milliseconds.
pub const STALE_AFTER_MS: u64 = 30_000;

const MILLIS_PER_SECOND: u64 = 1_000;

/// Rendered client state at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Records in URL order.
    pub records: Vec<PullRequestRecord>,
    /// True until the first snapshot arrives.
    pub loading: bool,
    /// True when the last snapshot is older than [`STALE_AFTER_MS`].
    pub stale: bool,
    /// True while the worker reports a rate-limit cooldown.
    pub rate_limited: bool,
    /// Whole seconds until the cooldown ends, while one is armed.
    pub retry_in_seconds: Option<u64>,
    /// Last error reported by the worker.
    pub error_message: Option<String>,
    /// Last transport failure, cleared by the next event.
    pub connection_error: Option<String>,
    /// True when records appeared or disappeared since the last
    /// acknowledgement.
    pub update_available: bool,
    /// `asOf` of the last snapshot, Unix milliseconds.
    pub last_snapshot_at: Option<u64>,
}

/// Client-side reconciliation of the worker event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientView {
    records: BTreeMap<String, PullRequestRecord>,
    received_snapshot: bool,
    last_snapshot_at: Option<u64>,
    update_available: bool,
    rate_limited: bool,
    retry_deadline: Option<u64>,
    error_message: Option<String>,
    connection_error: Option<String>,
}

impl ClientView {
    /// Creates an empty, loading view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `event`, received at `received_at` Unix milliseconds.
    pub fn apply(&mut self, event: WorkerEvent, received_at: u64) {
        self.connection_error = None;
        match event {
            WorkerEvent::Snapshot {
                records,
                as_of,
                status,
            } => {
                self.replace(records, as_of);
                if let Some(current) = status {
                    self.apply_status(current, received_at);
                }
            }
            WorkerEvent::Pr { record, .. } => {
                if self.records.insert(record.url.clone(), record).is_none() {
                    self.update_available = true;
                }
            }
            WorkerEvent::Status { status, .. } => self.apply_status(status, received_at),
            WorkerEvent::Heartbeat { .. } => {}
        }
    }

    /// Records a transport failure without discarding data.
    pub fn connection_lost(&mut self, message: impl Into<String>) {
        self.connection_error = Some(message.into());
    }

    /// Clears the "update available" flag.
    pub const fn acknowledge_update(&mut self) {
        self.update_available = false;
    }

    /// Returns true when no snapshot has arrived or the last one is older
    /// than [`STALE_AFTER_MS`] at `now`.
    #[must_use]
    pub fn is_stale(&self, now: u64) -> bool {
        self.last_snapshot_at
            .is_none_or(|as_of| now.saturating_sub(as_of) > STALE_AFTER_MS)
    }

    /// Seconds until the rate-limit cooldown ends, rounded up.
    #[must_use]
    pub fn retry_in_seconds(&self, now: u64) -> Option<u64> {
        self.retry_deadline
            .map(|deadline| deadline.saturating_sub(now).div_ceil(MILLIS_PER_SECOND))
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the view holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the view as seen at `now`.
    #[must_use]
    pub fn render(&self, now: u64) -> ViewState {
        ViewState {
            records: self.records.values().cloned().collect(),
            loading: !self.received_snapshot,
            stale: self.is_stale(now),
            rate_limited: self.rate_limited,
            retry_in_seconds: self.retry_in_seconds(now),
            error_message: self.error_message.clone(),
            connection_error: self.connection_error.clone(),
            update_available: self.update_available,
            last_snapshot_at: self.last_snapshot_at,
        }
    }

    fn replace(&mut self, records: Vec<PullRequestRecord>, as_of: u64) {
        let previous = self.records.len();
        self.records = records
            .into_iter()
            .map(|record| (record.url.clone(), record))
            .collect();
        if previous != 0 && self.records.len() != previous {
            self.update_available = true;
        }
        self.received_snapshot = true;
        // A zero asOf marks a worker that has not finished a cycle yet.
        self.last_snapshot_at = (as_of != 0).then_some(as_of);
    }

    fn apply_status(&mut self, status: WorkerStatus, received_at: u64) {
        match status {
            WorkerStatus::Starting => {}
            WorkerStatus::Running => {
                self.rate_limited = false;
                self.retry_deadline = None;
                self.error_message = None;
            }
            WorkerStatus::RateLimited { retry_after_ms, .. } => {
                self.rate_limited = true;
                self.retry_deadline = Some(received_at.saturating_add(retry_after_ms));
                self.error_message = None;
            }
            WorkerStatus::Error { message } => {
                self.rate_limited = false;
                self.retry_deadline = None;
                self.error_message = Some(message);
            }
        }
    }
}
