//! Gateway backed by the GitHub REST API through Octocrab.

use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::debug;

use crate::github::error::SourceError;
use crate::github::models::wire::{
    ApiNotification, ApiPullRequest, ApiSearchResults, ApiUser,
};
use crate::github::models::{NotificationThread, RawPullRequest};
use crate::github::rate_limit::RateLimitInfo;

use super::client::{DEFAULT_API_BASE, PersonalAccessToken, build_octocrab_client};
use super::error_mapping::{is_rate_limit_error, map_octocrab_error};
use super::{PullRequestQueries, SearchQuery};

/// Octocrab-backed implementation of [`PullRequestQueries`].
pub struct OctocrabQueryGateway {
    client: Octocrab,
}

impl OctocrabQueryGateway {
    /// Creates a new gateway from an Octocrab client.
    #[must_use]
    pub const fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Builds an authenticated gateway for `api_base`, defaulting to
    /// `https://api.github.com`.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Configuration` when the base URI cannot be
    /// parsed or `SourceError::Api` when Octocrab fails to construct a
    /// client.
    pub fn for_token(
        token: &PersonalAccessToken,
        api_base: Option<&str>,
    ) -> Result<Self, SourceError> {
        let octocrab = build_octocrab_client(token, api_base.unwrap_or(DEFAULT_API_BASE))?;
        Ok(Self::new(octocrab))
    }

    async fn get_json<T, P>(
        &self,
        operation: &str,
        route: &str,
        params: Option<&P>,
    ) -> Result<T, SourceError>
    where
        T: serde::de::DeserializeOwned + Send,
        P: serde::Serialize + ?Sized + Sync,
    {
        debug!(operation, route, "GET");
        match self.client.get::<T, _, _>(route, params).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self
                .map_octocrab_error_with_rate_limit(operation, &error)
                .await),
        }
    }

    async fn map_octocrab_error_with_rate_limit(
        &self,
        operation: &str,
        error: &octocrab::Error,
    ) -> SourceError {
        match error {
            octocrab::Error::GitHub { source, .. } if is_rate_limit_error(source) => {
                let rate_limit = self.fetch_rate_limit_info().await;
                let base_message =
                    format!("{operation} failed: {message}", message = source.message);
                let message = match &rate_limit {
                    Some(info) => format!(
                        "{base_message} ({remaining} of {limit} requests left, resets at {reset})",
                        remaining = info.remaining(),
                        limit = info.limit(),
                        reset = info.reset_at()
                    ),
                    None => base_message,
                };

                SourceError::RateLimitExceeded {
                    rate_limit,
                    message,
                }
            }
            _ => map_octocrab_error(operation, error),
        }
    }

    async fn fetch_rate_limit_info(&self) -> Option<RateLimitInfo> {
        let rate = self.client.ratelimit().get().await.ok()?.rate;
        let Ok(limit) = u32::try_from(rate.limit) else {
            return None;
        };
        let Ok(remaining) = u32::try_from(rate.remaining) else {
            return None;
        };
        Some(RateLimitInfo::new(limit, remaining, rate.reset))
    }
}

#[async_trait]
impl PullRequestQueries for OctocrabQueryGateway {
    async fn viewer_login(&self) -> Result<String, SourceError> {
        let user: ApiUser = self
            .get_json("viewer login", "/user", None::<&()>)
            .await?;
        user.login
            .filter(|login| !login.trim().is_empty())
            .ok_or_else(|| SourceError::Decode {
                operation: "viewer login".to_owned(),
                message: "response did not include a login".to_owned(),
            })
    }

    async fn notifications(&self) -> Result<Vec<NotificationThread>, SourceError> {
        let threads: Vec<ApiNotification> = self
            .get_json("notifications", "/notifications", None::<&()>)
            .await?;
        Ok(threads.into_iter().map(NotificationThread::from).collect())
    }

    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<RawPullRequest>, SourceError> {
        let terms = format!("is:pr {}", query.terms());
        let per_page = query.limit().to_string();
        let params = [("q", terms.as_str()), ("per_page", per_page.as_str())];

        let results: ApiSearchResults = self
            .get_json("search pull requests", "/search/issues", Some(&params))
            .await?;
        Ok(results.items.into_iter().map(RawPullRequest::from).collect())
    }

    async fn pull_request(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<RawPullRequest, SourceError> {
        let route = format!("/repos/{repository}/pulls/{number}");
        let details: ApiPullRequest = self
            .get_json("pull request details", &route, None::<&()>)
            .await?;
        Ok(details.into())
    }
}

#[cfg(test)]
mod tests;
