//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use super::{AppState, PullRequestsResponse, build_router};
use crate::favorites::StaticFavorites;
use crate::github::error::SourceError;
use crate::github::gateway::{PullRequestQueries, SearchQuery};
use crate::github::models::{NotificationThread, RawPullRequest};
use crate::limiter::TokenBucket;
use crate::source::PullRequestSource;
use crate::worker::{PullRequestWorker, WorkerOptions, WorkerStatus};

/// Provider with nothing to report.
struct QuietQueries;

#[async_trait]
impl PullRequestQueries for QuietQueries {
    async fn viewer_login(&self) -> Result<String, SourceError> {
        Ok("alice".to_owned())
    }

    async fn notifications(&self) -> Result<Vec<NotificationThread>, SourceError> {
        Ok(Vec::new())
    }

    async fn search_pull_requests(
        &self,
        _query: &SearchQuery,
    ) -> Result<Vec<RawPullRequest>, SourceError> {
        Ok(Vec::new())
    }

    async fn pull_request(
        &self,
        _repository: &str,
        _number: u64,
    ) -> Result<RawPullRequest, SourceError> {
        Ok(RawPullRequest::default())
    }
}

fn test_worker() -> PullRequestWorker {
    let plenty = NonZeroU32::new(1_000).expect("non-zero");
    PullRequestWorker::new(
        PullRequestSource::new(
            Arc::new(QuietQueries),
            Arc::new(TokenBucket::new(plenty, plenty, 1_000)),
        ),
        Arc::new(StaticFavorites::default()),
        WorkerOptions::default(),
    )
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

#[tokio::test]
async fn health_returns_200() {
    let app = build_router(AppState::new(test_worker()));

    let response = app.oneshot(get("/health")).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    assert_eq!(body.as_ref(), b"OK");
}

#[tokio::test]
async fn snapshot_endpoint_starts_the_worker() {
    let worker = test_worker();
    let app = build_router(AppState::new(worker.clone()));
    assert!(!worker.is_running());

    let response = app
        .oneshot(get("/api/pull-requests"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let decoded: PullRequestsResponse = serde_json::from_slice(&body).expect("json body");
    assert!(decoded.records.is_empty());
    assert!(!decoded.rate_limited);
    assert!(worker.is_running());

    worker.shutdown().await;
}

#[tokio::test]
async fn stream_endpoint_opens_with_a_snapshot_event() {
    let worker = test_worker();
    let app = build_router(AppState::new(worker.clone()));

    let response = app
        .oneshot(get("/api/pull-requests/stream"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );
    assert_eq!(worker.subscriber_count(), 1);

    let mut body = response.into_body();
    let frame = body
        .frame()
        .await
        .expect("first frame")
        .expect("frame should read");
    let data = frame.into_data().expect("data frame");
    let text = std::str::from_utf8(&data).expect("utf-8 frame");
    assert!(text.starts_with("event: snapshot\ndata: {"), "got {text:?}");
    assert!(text.contains(r#""type":"snapshot""#));

    drop(body);
    assert_eq!(worker.subscriber_count(), 0);
    assert!(!matches!(worker.snapshot().status, WorkerStatus::Error { .. }));

    worker.shutdown().await;
}
