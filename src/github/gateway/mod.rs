//! Gateways for querying GitHub pull requests.
//!
//! [`PullRequestQueries`] is the mockable seam between the data source
//! adapter and GitHub. [`GhCliGateway`] shells out to an authenticated `gh`
//! binary; [`OctocrabQueryGateway`] talks to the REST API with a personal
//! access token. Both return provider-neutral models.

mod client;
mod error_mapping;
mod gh_cli;
mod octocrab_queries;

pub use client::PersonalAccessToken;
pub use gh_cli::GhCliGateway;
pub use octocrab_queries::OctocrabQueryGateway;

use async_trait::async_trait;

use crate::github::error::SourceError;
use crate::github::models::{DiscoveryReason, NotificationThread, RawPullRequest};

/// Maximum hits requested per involvement search.
pub const USER_QUERY_LIMIT: u8 = 100;

/// Maximum hits requested per favorite repository search.
pub const FAVORITE_QUERY_LIMIT: u8 = 50;

/// Search qualifier relating the viewer to a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserQualifier {
    /// `author:<login>`
    Author,
    /// `review-requested:<login>`
    ReviewRequested,
    /// `reviewed-by:<login>`
    ReviewedBy,
    /// `commenter:<login>`
    Commenter,
}

impl UserQualifier {
    /// Every qualifier, in the order the adapter queries them.
    pub const ALL: [Self; 4] = [
        Self::Author,
        Self::ReviewRequested,
        Self::ReviewedBy,
        Self::Commenter,
    ];

    /// GitHub search qualifier keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::ReviewRequested => "review-requested",
            Self::ReviewedBy => "reviewed-by",
            Self::Commenter => "commenter",
        }
    }

    /// Discovery reason recorded for hits of this qualifier.
    #[must_use]
    pub const fn reason(self) -> DiscoveryReason {
        match self {
            Self::Author => DiscoveryReason::Author,
            Self::ReviewRequested => DiscoveryReason::ReviewRequested,
            Self::ReviewedBy => DiscoveryReason::Reviewed,
            Self::Commenter => DiscoveryReason::Commenter,
        }
    }
}

/// An open pull request search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Open pull requests the viewer is involved in.
    Involving {
        /// How the viewer is involved.
        qualifier: UserQualifier,
        /// Viewer login.
        login: String,
    },
    /// Open pull requests in one repository.
    Repository {
        /// Repository in `owner/name` form.
        repository: String,
    },
}

impl SearchQuery {
    /// Maximum number of hits to request.
    #[must_use]
    pub const fn limit(&self) -> u8 {
        match self {
            Self::Involving { .. } => USER_QUERY_LIMIT,
            Self::Repository { .. } => FAVORITE_QUERY_LIMIT,
        }
    }

    /// Search terms without the `is:pr` qualifier.
    #[must_use]
    pub fn terms(&self) -> String {
        match self {
            Self::Involving { qualifier, login } => {
                format!("state:open {}:{login}", qualifier.keyword())
            }
            Self::Repository { repository } => format!("repo:{repository} state:open"),
        }
    }
}

/// Provider queries used by the data source adapter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullRequestQueries: Send + Sync {
    /// Login of the authenticated viewer.
    async fn viewer_login(&self) -> Result<String, SourceError>;

    /// The viewer's notification threads, first page only.
    async fn notifications(&self) -> Result<Vec<NotificationThread>, SourceError>;

    /// Runs an open pull request search.
    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<RawPullRequest>, SourceError>;

    /// Full details of one pull request.
    async fn pull_request(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<RawPullRequest, SourceError>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{SearchQuery, UserQualifier};

    #[rstest]
    #[case::author(UserQualifier::Author, "state:open author:alice")]
    #[case::review_requested(UserQualifier::ReviewRequested, "state:open review-requested:alice")]
    #[case::reviewed_by(UserQualifier::ReviewedBy, "state:open reviewed-by:alice")]
    #[case::commenter(UserQualifier::Commenter, "state:open commenter:alice")]
    fn involvement_terms(#[case] qualifier: UserQualifier, #[case] expected: &str) {
        let query = SearchQuery::Involving {
            qualifier,
            login: "alice".to_owned(),
        };

        assert_eq!(query.terms(), expected);
        assert_eq!(query.limit(), 100);
    }

    #[rstest]
    fn repository_terms() {
        let query = SearchQuery::Repository {
            repository: "octo/widgets".to_owned(),
        };

        assert_eq!(query.terms(), "repo:octo/widgets state:open");
        assert_eq!(query.limit(), 50);
    }
}
