//! Data models for tracked pull requests.
//!
//! [`PullRequestRecord`] is the normalised entity shared by the worker, the
//! transport and the client reducer. [`RawPullRequest`] and
//! [`NotificationThread`] are the provider-neutral shapes returned by the
//! gateways before normalisation; the `wire` submodule holds the serde
//! targets for each provider's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub(crate) mod wire;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Open for review.
    #[default]
    Open,
    /// Closed without merging.
    Closed,
    /// Merged into its base branch.
    Merged,
}

impl PullRequestState {
    /// Interprets a provider state string together with its merged flag.
    ///
    /// Providers disagree on casing (`OPEN` from search, `open` from REST)
    /// and REST reports merged pull requests as `closed` plus `merged: true`.
    #[must_use]
    pub fn from_provider(state: Option<&str>, merged: bool) -> Self {
        if merged {
            return Self::Merged;
        }
        match state.map(str::to_ascii_lowercase).as_deref() {
            Some("merged") => Self::Merged,
            Some("closed") => Self::Closed,
            _ => Self::Open,
        }
    }
}

/// Aggregate review outcome reported by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// At least one approving review and no blocking reviews.
    Approved,
    /// A reviewer requested changes.
    ChangesRequested,
    /// Review is required before merging.
    ReviewRequired,
}

impl ReviewDecision {
    /// Parses GitHub's review decision string, ignoring unknown values.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "APPROVED" => Some(Self::Approved),
            "CHANGES_REQUESTED" => Some(Self::ChangesRequested),
            "REVIEW_REQUIRED" => Some(Self::ReviewRequired),
            _ => None,
        }
    }
}

/// Why a pull request is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryReason {
    /// The viewer opened the pull request.
    Author,
    /// The viewer's review was requested.
    ReviewRequested,
    /// The viewer reviewed the pull request.
    Reviewed,
    /// The viewer commented on the pull request.
    Commenter,
    /// The pull request appeared in the viewer's notifications.
    Notification,
    /// The pull request belongs to a favorited repository.
    Favorite,
}

impl DiscoveryReason {
    /// Human-readable label used when grouping by reason.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Author => "Author",
            Self::ReviewRequested => "Review requested",
            Self::Reviewed => "Reviewed",
            Self::Commenter => "Commenter",
            Self::Notification => "Notification",
            Self::Favorite => "Favorite",
        }
    }
}

/// Pull request author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// GitHub login, or `Unknown` when the provider omitted it.
    pub login: String,
    /// Avatar image URL if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Author {
    /// Placeholder author used when the provider returned none.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            login: "Unknown".to_owned(),
            avatar_url: None,
        }
    }
}

/// A tracked pull request, keyed by its canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestRecord {
    /// Pull request title.
    pub title: String,
    /// Canonical HTML URL; the primary key.
    pub url: String,
    /// Lifecycle state.
    pub state: PullRequestState,
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Pull request number within the repository.
    pub number: u64,
    /// Head branch name, or `pr-<number>` when it could not be resolved.
    pub head_ref: String,
    /// Review decision if GitHub reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_decision: Option<ReviewDecision>,
    /// Whether the pull request has been merged.
    pub merged: bool,
    /// Whether the pull request is a draft.
    pub draft: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Close time, if closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Pull request author.
    pub author: Author,
    /// Why this pull request is tracked.
    pub reason: DiscoveryReason,
}

impl PullRequestRecord {
    /// Returns true when the fields that drive change notifications differ.
    ///
    /// Only `updated_at`, `review_decision` and `draft` are compared; other
    /// differences (such as the discovery reason) do not count as changes.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.updated_at != other.updated_at
            || self.review_decision != other.review_decision
            || self.draft != other.draft
    }

    /// Returns true for open pull requests that have not been merged.
    #[must_use]
    pub fn is_open_and_unmerged(&self) -> bool {
        self.state == PullRequestState::Open && !self.merged
    }
}

/// Placeholder head ref used when the real branch cannot be resolved.
#[must_use]
pub fn placeholder_head_ref(number: u64) -> String {
    format!("pr-{number}")
}

/// Provider-neutral pull request fields before normalisation.
///
/// Every field is optional because search results, REST details and
/// notification payloads each carry a different subset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPullRequest {
    /// HTML URL.
    pub url: Option<String>,
    /// Title.
    pub title: Option<String>,
    /// Number.
    pub number: Option<u64>,
    /// Provider state string.
    pub state: Option<String>,
    /// Repository in `owner/name` form.
    pub repository: Option<String>,
    /// Head branch name.
    pub head_ref: Option<String>,
    /// Provider review decision string.
    pub review_decision: Option<String>,
    /// Merged flag.
    pub merged: Option<bool>,
    /// Draft flag.
    pub draft: Option<bool>,
    /// Creation timestamp (RFC 3339).
    pub created_at: Option<String>,
    /// Update timestamp (RFC 3339).
    pub updated_at: Option<String>,
    /// Close timestamp (RFC 3339).
    pub closed_at: Option<String>,
    /// Author login.
    pub author_login: Option<String>,
    /// Author avatar URL.
    pub author_avatar_url: Option<String>,
}

impl RawPullRequest {
    /// Returns true when the provider reports the pull request as open.
    ///
    /// A missing state counts as open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state
            .as_deref()
            .is_none_or(|state| state.eq_ignore_ascii_case("open"))
    }

    /// Overlays every field present in `details`, keeping this value's
    /// fields where `details` has none.
    #[must_use]
    pub fn overlay(self, details: Self) -> Self {
        Self {
            url: details.url.or(self.url),
            title: details.title.or(self.title),
            number: details.number.or(self.number),
            state: details.state.or(self.state),
            repository: details.repository.or(self.repository),
            head_ref: details.head_ref.or(self.head_ref),
            review_decision: details.review_decision.or(self.review_decision),
            merged: details.merged.or(self.merged),
            draft: details.draft.or(self.draft),
            created_at: details.created_at.or(self.created_at),
            updated_at: details.updated_at.or(self.updated_at),
            closed_at: details.closed_at.or(self.closed_at),
            author_login: details.author_login.or(self.author_login),
            author_avatar_url: details.author_avatar_url.or(self.author_avatar_url),
        }
    }

    /// Normalises the raw fields into a record.
    ///
    /// `repository` overrides whatever repository the provider reported.
    /// Missing timestamps fall back to `now`; a missing URL is rebuilt from
    /// the repository and number. Returns `None` when neither a number nor a
    /// repository can be determined.
    #[must_use]
    pub fn normalise(
        self,
        reason: DiscoveryReason,
        repository: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<PullRequestRecord> {
        let number = self.number?;
        let repository = repository.map(ToOwned::to_owned).or(self.repository)?;
        let url = self
            .url
            .unwrap_or_else(|| format!("https://github.com/{repository}/pull/{number}"));
        let merged = self.merged.unwrap_or(false);
        let state = PullRequestState::from_provider(self.state.as_deref(), merged);
        let author = self.author_login.map_or_else(Author::unknown, |login| Author {
            login,
            avatar_url: self.author_avatar_url,
        });

        Some(PullRequestRecord {
            title: self.title.unwrap_or_else(|| format!("PR #{number}")),
            url,
            state,
            repository,
            number,
            head_ref: self
                .head_ref
                .unwrap_or_else(|| placeholder_head_ref(number)),
            review_decision: self
                .review_decision
                .as_deref()
                .and_then(ReviewDecision::parse),
            merged: merged || state == PullRequestState::Merged,
            draft: self.draft.unwrap_or(false),
            created_at: parse_timestamp(self.created_at.as_deref()).unwrap_or(now),
            updated_at: parse_timestamp(self.updated_at.as_deref()).unwrap_or(now),
            closed_at: parse_timestamp(self.closed_at.as_deref()),
            author,
            reason,
        })
    }
}

/// A notification thread as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationThread {
    /// Subject type (`PullRequest`, `Issue`, ...).
    pub subject_type: Option<String>,
    /// API URL of the subject.
    pub subject_url: Option<String>,
    /// Subject title.
    pub title: Option<String>,
    /// Thread update timestamp (RFC 3339).
    pub updated_at: Option<String>,
}

impl NotificationThread {
    /// Returns true when the subject is a pull request.
    #[must_use]
    pub fn is_pull_request(&self) -> bool {
        self.subject_type.as_deref() == Some("PullRequest")
    }
}

/// Repository and number identifying a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Pull request number.
    pub number: u64,
}

impl PullRequestRef {
    /// Parses an API URL of the form `.../repos/{owner}/{repo}/pulls/{n}`.
    ///
    /// Both `api.github.com` and enterprise `/api/v3` prefixes are accepted.
    #[must_use]
    pub fn from_api_url(api_url: &str) -> Option<Self> {
        let parsed = Url::parse(api_url).ok()?;
        let segments: Vec<&str> = parsed.path_segments()?.collect();
        let start = segments.iter().position(|segment| *segment == "repos")?;
        match segments.get(start.saturating_add(1)..)? {
            [owner, repo, "pulls", number, ..] if !owner.is_empty() && !repo.is_empty() => {
                let parsed_number = number.parse::<u64>().ok().filter(|value| *value > 0)?;
                Some(Self {
                    repository: format!("{owner}/{repo}"),
                    number: parsed_number,
                })
            }
            _ => None,
        }
    }
}

/// Parses an RFC 3339 timestamp into UTC, ignoring malformed values.
#[must_use]
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
