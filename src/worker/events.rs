//! Worker status and the events pushed to subscribers.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::github::models::PullRequestRecord;

/// Current Unix time in milliseconds.
#[must_use]
pub fn epoch_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Lifecycle status of the aggregation worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkerStatus {
    /// Constructed, no cycle attempted yet.
    Starting,
    /// Polling normally.
    Running,
    /// Cooling down after the provider refused a request.
    RateLimited {
        /// Cooldown before the next attempt, in milliseconds.
        retry_after_ms: u64,
        /// Provider message that triggered the cooldown.
        message: String,
    },
    /// The last cycle failed; retrying after a backoff.
    Error {
        /// Failure description.
        message: String,
    },
}

impl WorkerStatus {
    /// Returns true while the worker is cooling down.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// An event emitted by the worker, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WorkerEvent {
    /// Full replacement of the record set.
    Snapshot {
        /// Every record in the canonical set.
        records: Vec<PullRequestRecord>,
        /// Time of the snapshot, Unix milliseconds; `0` before the first
        /// cycle.
        as_of: u64,
        /// Worker status; carried by the snapshot sent on subscribe.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<WorkerStatus>,
    },
    /// A record was inserted or changed.
    Pr {
        /// The new version of the record.
        record: PullRequestRecord,
        /// Emission time, Unix milliseconds.
        as_of: u64,
    },
    /// The worker status changed.
    Status {
        /// New status.
        status: WorkerStatus,
        /// Emission time, Unix milliseconds.
        as_of: u64,
    },
    /// End-of-cycle liveness signal.
    Heartbeat {
        /// Emission time, Unix milliseconds.
        as_of: u64,
    },
}

impl WorkerEvent {
    /// Event kind, used as the SSE event name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot { .. } => "snapshot",
            Self::Pr { .. } => "pr",
            Self::Status { .. } => "status",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Timestamp carried by the event.
    #[must_use]
    pub const fn as_of(&self) -> u64 {
        match self {
            Self::Snapshot { as_of, .. }
            | Self::Pr { as_of, .. }
            | Self::Status { as_of, .. }
            | Self::Heartbeat { as_of } => *as_of,
        }
    }
}
