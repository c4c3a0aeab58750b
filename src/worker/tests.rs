//! Tests for the poll loop, subscriptions and warm start.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use super::{
    CACHE_FRESHNESS_MS, PullRequestWorker, WorkerEvent, WorkerOptions, WorkerSnapshot,
    WorkerStatus,
};
use crate::favorites::StaticFavorites;
use crate::github::error::SourceError;
use crate::github::gateway::{PullRequestQueries, SearchQuery, UserQualifier};
use crate::github::models::test_support::{raw_hit, record};
use crate::github::models::{DiscoveryReason, NotificationThread, RawPullRequest};
use crate::limiter::TokenBucket;
use crate::persistence::{PersistedSnapshot, SnapshotFile};
use crate::source::PullRequestSource;
use crate::telemetry::TelemetryEvent;
use crate::telemetry::test_support::RecordingTelemetrySink;

/// Scripted provider: `alice` authored `acme/web#1` on branch `u1`.
#[derive(Default)]
struct ScriptedQueries {
    rate_limited: AtomicBool,
    network_failures: AtomicUsize,
    login_calls: AtomicUsize,
    notification_calls: AtomicUsize,
}

impl ScriptedQueries {
    fn rate_limited() -> Self {
        let queries = Self::default();
        queries.rate_limited.store(true, Ordering::SeqCst);
        queries
    }

    /// Fails the next `count` notification listings with a network error.
    fn failing_network(count: usize) -> Self {
        let queries = Self::default();
        queries.network_failures.store(count, Ordering::SeqCst);
        queries
    }

    fn notification_calls(&self) -> usize {
        self.notification_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullRequestQueries for ScriptedQueries {
    async fn viewer_login(&self) -> Result<String, SourceError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok("alice".to_owned())
    }

    async fn notifications(&self) -> Result<Vec<NotificationThread>, SourceError> {
        self.notification_calls.fetch_add(1, Ordering::SeqCst);
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(SourceError::RateLimitExceeded {
                rate_limit: None,
                message: "API rate limit exceeded".to_owned(),
            });
        }
        if self
            .network_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(SourceError::Network {
                message: "connection reset by peer".to_owned(),
            });
        }
        Ok(Vec::new())
    }

    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<RawPullRequest>, SourceError> {
        match query {
            SearchQuery::Involving {
                qualifier: UserQualifier::Author,
                ..
            } => Ok(vec![raw_hit("acme/web", 1)]),
            _ => Ok(Vec::new()),
        }
    }

    async fn pull_request(
        &self,
        _repository: &str,
        _number: u64,
    ) -> Result<RawPullRequest, SourceError> {
        Ok(RawPullRequest {
            head_ref: Some("u1".to_owned()),
            ..RawPullRequest::default()
        })
    }
}

fn worker_with(queries: Arc<ScriptedQueries>, options: WorkerOptions) -> PullRequestWorker {
    let plenty = NonZeroU32::new(10_000).expect("non-zero");
    let limiter = Arc::new(TokenBucket::new(plenty, plenty, 10_000));
    PullRequestWorker::new(
        PullRequestSource::new(queries, limiter),
        Arc::new(StaticFavorites::default()),
        options,
    )
}

async fn next_event(subscription: &mut super::Subscription) -> WorkerEvent {
    tokio::time::timeout(Duration::from_secs(600), subscription.recv())
        .await
        .expect("event should arrive")
        .expect("subscription should stay open")
}

#[tokio::test(start_paused = true)]
async fn first_cycle_publishes_record_then_snapshot() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(Arc::clone(&queries), WorkerOptions::default());
    let mut subscription = worker.subscribe();

    assert!(matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Snapshot { ref records, as_of: 0, status: Some(WorkerStatus::Starting) }
            if records.is_empty()
    ));

    worker.ensure_started();

    assert!(matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Status { status: WorkerStatus::Running, .. }
    ));
    let WorkerEvent::Pr { record: pr, .. } = next_event(&mut subscription).await else {
        panic!("expected a pr event");
    };
    assert_eq!(pr.url, "https://github.com/acme/web/pull/1");
    assert_eq!(pr.head_ref, "u1");
    assert_eq!(pr.reason, DiscoveryReason::Author);

    let WorkerEvent::Snapshot {
        records, as_of, ..
    } = next_event(&mut subscription).await
    else {
        panic!("expected a snapshot event");
    };
    assert_eq!(records, vec![pr]);
    assert!(matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Heartbeat { .. }
    ));

    let snapshot = worker.snapshot();
    assert_eq!(snapshot.as_of, Some(as_of));
    assert!(!snapshot.is_cached_at(as_of));
    assert!(snapshot.is_cached_at(as_of + 31_000));

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn later_cycles_only_repeat_snapshots_and_heartbeats() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(Arc::clone(&queries), WorkerOptions::default());
    let mut subscription = worker.subscribe();
    worker.ensure_started();

    let mut kinds = Vec::new();
    for _ in 0..8 {
        kinds.push(next_event(&mut subscription).await.kind());
    }

    assert_eq!(
        kinds,
        vec![
            "snapshot",
            "status",
            "pr",
            "snapshot",
            "heartbeat",
            "snapshot",
            "heartbeat",
            "snapshot"
        ]
    );
    assert_eq!(queries.login_calls.load(Ordering::SeqCst), 1);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limit_pauses_polling_for_the_cooldown() {
    let queries = Arc::new(ScriptedQueries::rate_limited());
    let telemetry = Arc::new(RecordingTelemetrySink::default());
    let worker = worker_with(
        Arc::clone(&queries),
        WorkerOptions {
            telemetry: Arc::clone(&telemetry) as _,
            ..WorkerOptions::default()
        },
    );
    let mut subscription = worker.subscribe();
    worker.ensure_started();

    let mut status = None;
    while status.is_none() {
        if let WorkerEvent::Status {
            status: WorkerStatus::RateLimited { retry_after_ms, .. },
            ..
        } = next_event(&mut subscription).await
        {
            status = Some(retry_after_ms);
        }
    }

    assert_eq!(status, Some(120_000));
    assert!(worker.snapshot().status.is_rate_limited());
    assert_eq!(
        telemetry.take(),
        vec![TelemetryEvent::RateLimited {
            retry_after_ms: 120_000
        }]
    );
    assert_eq!(queries.notification_calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(queries.notification_calls(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(queries.notification_calls(), 2);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failure_reports_error_then_recovers_after_backoff() {
    let queries = Arc::new(ScriptedQueries::failing_network(1));
    let worker = worker_with(Arc::clone(&queries), WorkerOptions::default());
    let mut subscription = worker.subscribe();
    assert!(matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Snapshot { .. }
    ));
    worker.ensure_started();

    assert!(matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Status { status: WorkerStatus::Running, .. }
    ));
    let WorkerEvent::Status {
        status: WorkerStatus::Error { message },
        ..
    } = next_event(&mut subscription).await
    else {
        panic!("expected an error status");
    };
    assert!(message.contains("connection reset by peer"), "unexpected message: {message}");
    assert!(matches!(worker.snapshot().status, WorkerStatus::Error { .. }));
    assert_eq!(queries.notification_calls(), 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(queries.notification_calls(), 1, "retried before the backoff elapsed");

    let kinds = [
        next_event(&mut subscription).await,
        next_event(&mut subscription).await,
        next_event(&mut subscription).await,
    ];
    assert!(matches!(
        kinds,
        [
            WorkerEvent::Status { status: WorkerStatus::Running, .. },
            WorkerEvent::Pr { .. },
            WorkerEvent::Snapshot { .. },
        ]
    ));
    assert_eq!(queries.notification_calls(), 2);
    assert_eq!(worker.snapshot().status, WorkerStatus::Running);

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_keeps_publishing_snapshots() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("snapshot-dir"))
        .expect("utf-8 temp path");
    std::fs::create_dir(&path).expect("create directory in place of the snapshot");

    let worker = worker_with(
        Arc::new(ScriptedQueries::default()),
        WorkerOptions {
            snapshot_file: Some(SnapshotFile::new(path.clone())),
            ..WorkerOptions::default()
        },
    );
    let mut subscription = worker.subscribe();
    worker.ensure_started();

    let mut snapshots = Vec::new();
    while snapshots.len() < 2 {
        if let WorkerEvent::Snapshot { records, .. } = next_event(&mut subscription).await {
            snapshots.push(records);
        }
    }
    while !matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Heartbeat { .. }
    ) {}

    assert_eq!(snapshots.last().map(Vec::len), Some(1));
    let current = worker.snapshot();
    assert_eq!(current.records.len(), 1);
    assert_eq!(current.status, WorkerStatus::Running);
    assert!(current.as_of.is_some());
    assert!(path.is_dir(), "the directory should be left in place");

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_subscriber_does_not_disturb_others() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(queries, WorkerOptions::default());
    let mut kept = worker.subscribe();
    let dropped = worker.subscribe();
    assert_eq!(worker.subscriber_count(), 2);

    dropped.unsubscribe();
    assert_eq!(worker.subscriber_count(), 1);
    worker.ensure_started();

    let mut saw_pr = false;
    for _ in 0..5 {
        saw_pr |= matches!(next_event(&mut kept).await, WorkerEvent::Pr { .. });
    }

    assert!(saw_pr);
    assert_eq!(worker.subscriber_count(), 1);
    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_starts_from_current_snapshot() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(queries, WorkerOptions::default());
    let mut early = worker.subscribe();
    worker.ensure_started();
    while !matches!(next_event(&mut early).await, WorkerEvent::Heartbeat { .. }) {}

    let mut late = worker.subscribe();

    let WorkerEvent::Snapshot {
        records, status, ..
    } = next_event(&mut late).await
    else {
        panic!("late subscriber should start with a snapshot");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(status, Some(WorkerStatus::Running));

    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ensure_started_is_idempotent() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(Arc::clone(&queries), WorkerOptions::default());
    let mut subscription = worker.subscribe();

    worker.ensure_started();
    worker.ensure_started();
    assert!(worker.is_running());
    while !matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Heartbeat { .. }
    ) {}

    assert_eq!(queries.notification_calls(), 1);

    worker.shutdown().await;
    assert!(!worker.is_running());
}

#[tokio::test(start_paused = true)]
async fn stop_then_start_resumes_polling() {
    let queries = Arc::new(ScriptedQueries::default());
    let worker = worker_with(Arc::clone(&queries), WorkerOptions::default());

    worker.ensure_started();
    worker.stop();
    tokio::task::yield_now().await;
    worker.ensure_started();
    let mut subscription = worker.subscribe();
    while !matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Heartbeat { .. }
    ) {}

    assert!(worker.is_running());
    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cycles_persist_and_warm_start_restores() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("snapshot.json"))
        .expect("utf-8 temp path");

    let first = worker_with(
        Arc::new(ScriptedQueries::default()),
        WorkerOptions {
            snapshot_file: Some(SnapshotFile::new(path.clone())),
            ..WorkerOptions::default()
        },
    );
    let mut subscription = first.subscribe();
    first.ensure_started();
    while !matches!(
        next_event(&mut subscription).await,
        WorkerEvent::Heartbeat { .. }
    ) {}
    first.shutdown().await;

    let persisted = SnapshotFile::new(path.clone())
        .try_load()
        .expect("snapshot should read")
        .expect("snapshot should exist");
    assert_eq!(persisted.records.len(), 1);

    let second = worker_with(
        Arc::new(ScriptedQueries::default()),
        WorkerOptions {
            snapshot_file: Some(SnapshotFile::new(path)),
            ..WorkerOptions::default()
        },
    );
    let restored = second.snapshot();
    assert_eq!(restored.records, persisted.records);
    assert_eq!(restored.as_of, Some(persisted.as_of));
    assert!(!second.is_running());
}

#[rstest]
fn warm_start_ignores_corrupt_snapshot() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("snapshot.json"))
        .expect("utf-8 temp path");
    std::fs::write(&path, "{ not json").expect("write corrupt file");

    let worker = worker_with(
        Arc::new(ScriptedQueries::default()),
        WorkerOptions {
            snapshot_file: Some(SnapshotFile::new(path)),
            ..WorkerOptions::default()
        },
    );

    let snapshot = worker.snapshot();
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.as_of, None);
    assert_eq!(snapshot.status, WorkerStatus::Starting);
}

#[rstest]
fn warm_start_loads_existing_records() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("snapshot.json"))
        .expect("utf-8 temp path");
    let file = SnapshotFile::new(path);
    file.save(&PersistedSnapshot {
        as_of: 1_700_000_000_000,
        records: vec![record("octo/widgets", 4)],
    })
    .expect("save snapshot");

    let worker = worker_with(
        Arc::new(ScriptedQueries::default()),
        WorkerOptions {
            snapshot_file: Some(file),
            ..WorkerOptions::default()
        },
    );

    let mut subscription = worker.subscribe();
    let Some(WorkerEvent::Snapshot { records, as_of, .. }) = subscription.try_recv() else {
        panic!("expected an initial snapshot");
    };
    assert_eq!(records, vec![record("octo/widgets", 4)]);
    assert_eq!(as_of, 1_700_000_000_000);
}

#[rstest]
#[case::never_published(None, 0, false)]
#[case::fresh(Some(1_000), 1_000 + CACHE_FRESHNESS_MS - 1, false)]
#[case::stale(Some(1_000), 1_000 + CACHE_FRESHNESS_MS, true)]
fn cached_flag_tracks_snapshot_age(
    #[case] as_of: Option<u64>,
    #[case] now_ms: u64,
    #[case] expected: bool,
) {
    let snapshot = WorkerSnapshot {
        records: Vec::new(),
        as_of,
        status: WorkerStatus::Running,
        status_as_of: 0,
    };

    assert_eq!(snapshot.is_cached_at(now_ms), expected);
}
