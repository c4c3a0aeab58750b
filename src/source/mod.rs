//! Rate-limited pull request data source.
//!
//! [`PullRequestSource`] runs the three query classes the worker polls
//! (notifications, involvement searches and favorite repositories) against a
//! [`PullRequestQueries`] provider. Every provider call first waits on the
//! shared [`TokenBucket`] and is raced against the cycle's cancellation
//! token. Results are normalised into [`PullRequestRecord`]s.
//!
//! Per-item detail lookups degrade the affected record when they fail,
//! except for cancellation and rate-limit errors, which abort the cycle.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::github::error::SourceError;
use crate::github::gateway::{PullRequestQueries, SearchQuery, UserQualifier};
use crate::github::models::{
    DiscoveryReason, NotificationThread, PullRequestRecord, PullRequestRef, RawPullRequest,
};
use crate::limiter::{RequestKind, TokenBucket};

/// Rate-limited adapter over a pull request provider.
#[derive(Clone)]
pub struct PullRequestSource {
    queries: Arc<dyn PullRequestQueries>,
    limiter: Arc<TokenBucket>,
}

impl PullRequestSource {
    /// Creates a source charging every provider call to `limiter`.
    #[must_use]
    pub const fn new(queries: Arc<dyn PullRequestQueries>, limiter: Arc<TokenBucket>) -> Self {
        Self { queries, limiter }
    }

    /// Resolves the viewer's login.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `SourceError::Cancelled` when `cancel`
    /// fires first.
    pub async fn resolve_identity(&self, cancel: &CancellationToken) -> Result<String, SourceError> {
        self.guarded(RequestKind::Whoami, cancel, self.queries.viewer_login())
            .await
    }

    /// Pull requests from the viewer's notification threads.
    ///
    /// Only pull-request subjects whose API URL names a repository and
    /// number are kept. Each is enriched with a detail lookup; when the
    /// lookup fails the record is built from the notification alone.
    ///
    /// # Errors
    ///
    /// Returns an error when listing notifications fails, or when a detail
    /// lookup is rate limited or cancelled.
    pub async fn fetch_notifications(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<PullRequestRecord>, SourceError> {
        let threads = self
            .guarded(RequestKind::Notifications, cancel, self.queries.notifications())
            .await?;

        let mut records = Vec::new();
        for thread in threads {
            if !thread.is_pull_request() {
                continue;
            }
            let Some(reference) = thread
                .subject_url
                .as_deref()
                .and_then(PullRequestRef::from_api_url)
            else {
                debug!(url = ?thread.subject_url, "skipping notification without a pull request URL");
                continue;
            };

            let base = notification_base(&thread, &reference);
            let raw = match self
                .details(&reference.repository, reference.number, RequestKind::Notifications, cancel)
                .await
            {
                Ok(details) => base.overlay(details),
                Err(error) if error.aborts_cycle() => return Err(error),
                Err(error) => {
                    warn!(
                        repository = %reference.repository,
                        number = reference.number,
                        %error,
                        "failed to fetch pull request details; using notification data"
                    );
                    base
                }
            };

            if let Some(record) = raw.normalise(
                DiscoveryReason::Notification,
                Some(&reference.repository),
                Utc::now(),
            ) {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Open pull requests the viewer authored, was asked to review, reviewed
    /// or commented on.
    ///
    /// Hits that are not open are skipped. A URL found by more than one
    /// query is kept once, with the reason of the first query that found it.
    ///
    /// # Errors
    ///
    /// Returns an error when any search fails, or when a detail lookup is
    /// rate limited or cancelled.
    pub async fn fetch_user_queries(
        &self,
        identity: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PullRequestRecord>, SourceError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for qualifier in UserQualifier::ALL {
            let query = SearchQuery::Involving {
                qualifier,
                login: identity.to_owned(),
            };
            let hits = self
                .guarded(
                    RequestKind::UserQuery,
                    cancel,
                    self.queries.search_pull_requests(&query),
                )
                .await?;

            for hit in hits {
                if !hit.is_open() {
                    continue;
                }
                if let Some(url) = hit.url.as_deref()
                    && seen.contains(url)
                {
                    continue;
                }

                let enriched = self
                    .with_head_ref(hit, None, RequestKind::UserQuery, cancel)
                    .await?;
                if let Some(record) = enriched.normalise(qualifier.reason(), None, Utc::now())
                    && seen.insert(record.url.clone())
                {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Open pull requests in each favorite repository.
    ///
    /// A repository the provider reports as unsearchable or inaccessible is
    /// logged and skipped; the remaining repositories are still queried.
    ///
    /// # Errors
    ///
    /// Returns any other search failure, and rate-limit or cancellation
    /// errors raised by detail lookups.
    pub async fn fetch_favorites(
        &self,
        repositories: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<PullRequestRecord>, SourceError> {
        let mut records = Vec::new();

        for repository in repositories {
            let query = SearchQuery::Repository {
                repository: repository.clone(),
            };
            let hits = match self
                .guarded(
                    RequestKind::FavoriteRepo,
                    cancel,
                    self.queries.search_pull_requests(&query),
                )
                .await
            {
                Ok(hits) => hits,
                Err(error) if !error.aborts_cycle() && error.is_inaccessible_repository() => {
                    warn!(%repository, %error, "skipping inaccessible favorite repository");
                    continue;
                }
                Err(error) => return Err(error),
            };

            for hit in hits {
                if !hit.is_open() {
                    continue;
                }
                let enriched = self
                    .with_head_ref(hit, Some(repository), RequestKind::FavoriteRepo, cancel)
                    .await?;
                if let Some(record) =
                    enriched.normalise(DiscoveryReason::Favorite, Some(repository), Utc::now())
                {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }

    /// Fills in the head ref of a search hit from a detail lookup.
    async fn with_head_ref(
        &self,
        hit: RawPullRequest,
        fallback_repository: Option<&str>,
        kind: RequestKind,
        cancel: &CancellationToken,
    ) -> Result<RawPullRequest, SourceError> {
        let Some(number) = hit.number else {
            return Ok(hit);
        };
        let Some(repository) = hit
            .repository
            .clone()
            .or_else(|| fallback_repository.map(ToOwned::to_owned))
        else {
            return Ok(hit);
        };

        match self.details(&repository, number, kind, cancel).await {
            Ok(details) => Ok(RawPullRequest {
                head_ref: details.head_ref.or(hit.head_ref),
                ..hit
            }),
            Err(error) if error.aborts_cycle() => Err(error),
            Err(error) => {
                warn!(%repository, number, %error, "failed to fetch pull request details");
                Ok(hit)
            }
        }
    }

    async fn details(
        &self,
        repository: &str,
        number: u64,
        kind: RequestKind,
        cancel: &CancellationToken,
    ) -> Result<RawPullRequest, SourceError> {
        debug!(%repository, number, "fetching pull request details");
        self.guarded(kind, cancel, self.queries.pull_request(repository, number))
            .await
    }

    /// Charges `kind` to the limiter, then runs `call` unless `cancel` fires.
    async fn guarded<T, F>(
        &self,
        kind: RequestKind,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>> + Send,
    {
        self.limiter.wait_and_consume(kind.cost(), cancel).await?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(SourceError::Cancelled),
            result = call => result,
        }
    }
}

/// Fields a notification thread can supply when details are unavailable.
fn notification_base(thread: &NotificationThread, reference: &PullRequestRef) -> RawPullRequest {
    RawPullRequest {
        title: thread.title.clone(),
        number: Some(reference.number),
        state: Some("open".to_owned()),
        repository: Some(reference.repository.clone()),
        created_at: thread.updated_at.clone(),
        updated_at: thread.updated_at.clone(),
        ..RawPullRequest::default()
    }
}
