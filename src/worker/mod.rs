//! The pull request aggregation worker.
//!
//! [`PullRequestWorker`] owns the canonical set and runs a single polling
//! loop: each cycle resolves the viewer, queries notifications, involvement
//! searches and favorite repositories through the rate-limited
//! [`PullRequestSource`], upserts the results and publishes events to every
//! [`Subscription`]. The set is mutated only by the loop task; readers get
//! copies.
//!
//! Events are published while the shared state lock is held, and new
//! subscribers register under the same lock, so the snapshot a subscriber
//! receives first is consistent with every event that follows it.

mod classify;
mod events;
mod hub;
mod store;

pub use classify::{Failure, classify_failure, classify_failure_at};
pub use events::{WorkerEvent, WorkerStatus, epoch_millis};
pub use hub::{EventHub, Subscription};
pub use store::{CanonicalSet, UpsertOutcome};

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::favorites::FavoritesSource;
use crate::github::error::SourceError;
use crate::github::models::PullRequestRecord;
use crate::persistence::{PersistedSnapshot, SnapshotFile};
use crate::source::PullRequestSource;
use crate::telemetry::{NoopTelemetrySink, TelemetryEvent, TelemetrySink};

/// Age at which a snapshot is reported as cached, in milliseconds.
pub const CACHE_FRESHNESS_MS: u64 = 30_000;

/// Timing knobs for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Pause between successful cycles.
    pub poll_interval: Duration,
    /// Pause after a failed cycle.
    pub error_backoff: Duration,
    /// Cooldown after a rate-limit refusal without a known reset time.
    pub rate_limit_cooldown: Duration,
    /// Longest single sleep while cooling down.
    pub cooldown_step: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(120),
            cooldown_step: Duration::from_secs(1),
        }
    }
}

/// Construction options for [`PullRequestWorker`].
#[derive(Clone)]
pub struct WorkerOptions {
    /// Loop timing.
    pub settings: WorkerSettings,
    /// Where to read and write the warm-start snapshot, if anywhere.
    pub snapshot_file: Option<SnapshotFile>,
    /// Destination for cycle telemetry.
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            settings: WorkerSettings::default(),
            snapshot_file: None,
            telemetry: Arc::new(NoopTelemetrySink),
        }
    }
}

/// Point-in-time copy of the worker's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Records in the canonical set.
    pub records: Vec<PullRequestRecord>,
    /// Time of the last published snapshot, Unix milliseconds.
    pub as_of: Option<u64>,
    /// Current status.
    pub status: WorkerStatus,
    /// When the status last changed, Unix milliseconds.
    pub status_as_of: u64,
}

impl WorkerSnapshot {
    /// Returns true when the data is at least [`CACHE_FRESHNESS_MS`] old at
    /// `now_ms`. A worker that has never published a snapshot is not cached.
    #[must_use]
    pub fn is_cached_at(&self, now_ms: u64) -> bool {
        self.as_of
            .is_some_and(|as_of| now_ms.saturating_sub(as_of) >= CACHE_FRESHNESS_MS)
    }
}

#[derive(Debug)]
struct Shared {
    set: CanonicalSet,
    last_snapshot_at: Option<u64>,
    status: WorkerStatus,
    status_as_of: u64,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct WorkerInner {
    source: PullRequestSource,
    favorites: Arc<dyn FavoritesSource>,
    settings: WorkerSettings,
    snapshot_file: Option<SnapshotFile>,
    telemetry: Arc<dyn TelemetrySink>,
    identity: OnceLock<String>,
    shared: Mutex<Shared>,
    hub: Arc<EventHub>,
    running: Mutex<Option<RunningLoop>>,
}

/// Counts reported by a successful cycle.
struct CycleSummary {
    records: usize,
    emitted: usize,
}

/// Handle to the aggregation worker. Clones share the same worker.
#[derive(Clone)]
pub struct PullRequestWorker {
    inner: Arc<WorkerInner>,
}

impl PullRequestWorker {
    /// Creates a stopped worker, pre-populating the canonical set from the
    /// snapshot file when one is configured and readable.
    #[must_use]
    pub fn new(
        source: PullRequestSource,
        favorites: Arc<dyn FavoritesSource>,
        options: WorkerOptions,
    ) -> Self {
        let WorkerOptions {
            settings,
            snapshot_file,
            telemetry,
        } = options;

        let restored = snapshot_file.as_ref().and_then(SnapshotFile::load);
        let (set, last_snapshot_at) = restored.map_or_else(
            || (CanonicalSet::default(), None),
            |snapshot| {
                info!(
                    records = snapshot.records.len(),
                    as_of = snapshot.as_of,
                    "restored persisted snapshot"
                );
                (
                    CanonicalSet::from_records(snapshot.records),
                    Some(snapshot.as_of),
                )
            },
        );

        Self {
            inner: Arc::new(WorkerInner {
                source,
                favorites,
                settings,
                snapshot_file,
                telemetry,
                identity: OnceLock::new(),
                shared: Mutex::new(Shared {
                    set,
                    last_snapshot_at,
                    status: WorkerStatus::Starting,
                    status_as_of: epoch_millis(),
                }),
                hub: Arc::new(EventHub::default()),
                running: Mutex::new(None),
            }),
        }
    }

    /// Starts the poll loop unless it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn ensure_started(&self) {
        let mut running = self.inner.lock_running();
        if running
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
        {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), cancel.clone()));
        *running = Some(RunningLoop { cancel, handle });
    }

    /// Signals the poll loop to stop without waiting for it.
    pub fn stop(&self) {
        if let Some(current) = self.inner.lock_running().take() {
            current.cancel.cancel();
        }
    }

    /// Stops the poll loop and waits for it to exit.
    pub async fn shutdown(&self) {
        let current = self.inner.lock_running().take();
        if let Some(RunningLoop { cancel, handle }) = current {
            cancel.cancel();
            if let Err(error) = handle.await {
                warn!(%error, "worker loop ended abnormally");
            }
        }
    }

    /// Returns true while the poll loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .lock_running()
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> WorkerSnapshot {
        let shared = self.inner.lock_shared();
        WorkerSnapshot {
            records: shared.set.records(),
            as_of: shared.last_snapshot_at,
            status: shared.status.clone(),
            status_as_of: shared.status_as_of,
        }
    }

    /// Subscribes to worker events.
    ///
    /// The first event is a snapshot of the current set carrying the
    /// current status.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let shared = self.inner.lock_shared();
        let initial = WorkerEvent::Snapshot {
            records: shared.set.records(),
            as_of: shared.last_snapshot_at.unwrap_or_default(),
            status: Some(shared.status.clone()),
        };
        self.inner.hub.register(initial)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }
}

async fn run_loop(inner: Arc<WorkerInner>, cancel: CancellationToken) {
    info!("pull request worker started");
    let mut cooldown_until: Option<Instant> = None;

    loop {
        if let Some(deadline) = cooldown_until.take()
            && !inner.cool_down(deadline, &cancel).await
        {
            break;
        }
        if cancel.is_cancelled() {
            break;
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = inner.run_cycle(&cancel) => outcome,
        };

        let pause = match outcome {
            Ok(summary) => {
                inner.telemetry.record(TelemetryEvent::CycleCompleted {
                    records: summary.records,
                    emitted: summary.emitted,
                    duration_ms: duration_millis(started.elapsed()),
                });
                inner.settings.poll_interval
            }
            Err(SourceError::Cancelled) => break,
            Err(error) => match classify_failure(&error, inner.settings.rate_limit_cooldown) {
                Failure::RateLimited {
                    retry_after,
                    message,
                } => {
                    let retry_after_ms = duration_millis(retry_after);
                    warn!(retry_after_ms, %message, "rate limited; cooling down");
                    inner.set_status(WorkerStatus::RateLimited {
                        retry_after_ms,
                        message,
                    });
                    inner
                        .telemetry
                        .record(TelemetryEvent::RateLimited { retry_after_ms });
                    cooldown_until = Some(Instant::now() + retry_after);
                    continue;
                }
                Failure::Transient { message } => {
                    warn!(%message, "poll cycle failed");
                    inner.set_status(WorkerStatus::Error { message });
                    inner.settings.error_backoff
                }
            },
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    info!("pull request worker stopped");
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl WorkerInner {
    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleSummary, SourceError> {
        let identity = self.identity(cancel).await?;
        let favorites = self.favorites.favorites()?;

        self.set_status(WorkerStatus::Running);
        let cycle_as_of = epoch_millis();

        let notifications = self.source.fetch_notifications(cancel).await?;
        let mut emitted = self.upsert_all(notifications, cycle_as_of);

        let involved = self.source.fetch_user_queries(&identity, cancel).await?;
        emitted = emitted.saturating_add(self.upsert_all(involved, cycle_as_of));

        let favorite_records = self.source.fetch_favorites(&favorites, cancel).await?;
        emitted = emitted.saturating_add(self.upsert_all(favorite_records, cycle_as_of));

        let records = self.publish_snapshot(cycle_as_of);
        let summary = CycleSummary {
            records: records.len(),
            emitted,
        };
        self.persist(records, cycle_as_of).await;

        self.publish_heartbeat();
        debug!(records = summary.records, emitted = summary.emitted, "cycle complete");
        Ok(summary)
    }

    async fn identity(&self, cancel: &CancellationToken) -> Result<String, SourceError> {
        if let Some(login) = self.identity.get() {
            return Ok(login.clone());
        }
        let login = self.source.resolve_identity(cancel).await?;
        info!(%login, "resolved viewer identity");
        Ok(self.identity.get_or_init(|| login).clone())
    }

    /// Sleeps towards `deadline` in bounded steps. Returns false if
    /// cancelled.
    async fn cool_down(&self, deadline: Instant, cancel: &CancellationToken) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = deadline
                .saturating_duration_since(now)
                .min(self.settings.cooldown_step);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(step) => {}
            }
        }
    }

    /// Records and publishes `status`. `Running` is only published when the
    /// status actually changes.
    fn set_status(&self, status: WorkerStatus) {
        let mut shared = self.lock_shared();
        if status == WorkerStatus::Running && shared.status == WorkerStatus::Running {
            return;
        }
        let as_of = epoch_millis();
        shared.status = status.clone();
        shared.status_as_of = as_of;
        self.hub.publish(&WorkerEvent::Status { status, as_of });
    }

    fn upsert_all(&self, records: Vec<PullRequestRecord>, as_of: u64) -> usize {
        let mut shared = self.lock_shared();
        let mut emitted = 0_usize;
        for record in records {
            if shared.set.upsert(record.clone()).is_change() {
                self.hub.publish(&WorkerEvent::Pr { record, as_of });
                emitted = emitted.saturating_add(1);
            }
        }
        emitted
    }

    fn publish_snapshot(&self, as_of: u64) -> Vec<PullRequestRecord> {
        let mut shared = self.lock_shared();
        shared.last_snapshot_at = Some(as_of);
        let records = shared.set.records();
        self.hub.publish(&WorkerEvent::Snapshot {
            records: records.clone(),
            as_of,
            status: None,
        });
        records
    }

    fn publish_heartbeat(&self) {
        let _shared = self.lock_shared();
        self.hub.publish(&WorkerEvent::Heartbeat {
            as_of: epoch_millis(),
        });
    }

    async fn persist(&self, records: Vec<PullRequestRecord>, as_of: u64) {
        let Some(file) = self.snapshot_file.clone() else {
            return;
        };
        let snapshot = PersistedSnapshot { as_of, records };
        match tokio::task::spawn_blocking(move || file.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(%error, "failed to persist snapshot"),
            Err(error) => warn!(%error, "snapshot persistence task failed"),
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests;
