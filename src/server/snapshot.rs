//! Snapshot endpoint.
//!
//! Served from memory; never triggers a provider call of its own.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::github::models::PullRequestRecord;
use crate::worker::{WorkerSnapshot, WorkerStatus, epoch_millis};

/// Body of `GET /api/pull-requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestsResponse {
    /// Every record in the canonical set.
    pub records: Vec<PullRequestRecord>,
    /// True when the last snapshot is 30 seconds old or older.
    pub cached: bool,
    /// True while the worker is cooling down.
    pub rate_limited: bool,
    /// Time of the last snapshot, Unix milliseconds.
    pub as_of: Option<u64>,
    /// Current worker status.
    pub status: WorkerStatus,
}

impl PullRequestsResponse {
    /// Builds the response for `snapshot` as seen at `now_ms`.
    #[must_use]
    pub fn from_snapshot(snapshot: WorkerSnapshot, now_ms: u64) -> Self {
        let cached = snapshot.is_cached_at(now_ms);
        Self {
            cached,
            rate_limited: snapshot.status.is_rate_limited(),
            as_of: snapshot.as_of,
            status: snapshot.status,
            records: snapshot.records,
        }
    }
}

/// Returns the worker's current state, starting the worker if needed.
pub async fn snapshot_handler(State(app_state): State<AppState>) -> Json<PullRequestsResponse> {
    let worker = app_state.worker();
    worker.ensure_started();
    Json(PullRequestsResponse::from_snapshot(
        worker.snapshot(),
        epoch_millis(),
    ))
}
