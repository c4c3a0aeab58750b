//! Deserialisation targets for GitHub payloads.
//!
//! REST responses (`/user`, `/notifications`, `/search/issues`,
//! `/repos/{repo}/pulls/{n}`) use snake_case field names while
//! `gh search prs --json` emits camelCase. Each shape converts into the
//! provider-neutral [`RawPullRequest`] or [`NotificationThread`].

use serde::Deserialize;

use super::{NotificationThread, RawPullRequest};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiUser {
    pub(crate) login: Option<String>,
    pub(crate) avatar_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiHead {
    #[serde(rename = "ref")]
    pub(crate) ref_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiBaseRepository {
    pub(crate) full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiBase {
    pub(crate) repo: Option<ApiBaseRepository>,
}

/// `GET /repos/{repo}/pulls/{n}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiPullRequest {
    pub(crate) html_url: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) number: Option<u64>,
    pub(crate) state: Option<String>,
    pub(crate) merged: Option<bool>,
    pub(crate) draft: Option<bool>,
    pub(crate) review_decision: Option<String>,
    pub(crate) created_at: Option<String>,
    pub(crate) updated_at: Option<String>,
    pub(crate) closed_at: Option<String>,
    pub(crate) user: Option<ApiUser>,
    pub(crate) head: Option<ApiHead>,
    pub(crate) base: Option<ApiBase>,
}

impl From<ApiPullRequest> for RawPullRequest {
    fn from(api: ApiPullRequest) -> Self {
        let user = api.user.unwrap_or_default();
        Self {
            url: api.html_url,
            title: api.title,
            number: api.number,
            state: api.state,
            repository: api
                .base
                .and_then(|base| base.repo)
                .and_then(|repo| repo.full_name),
            head_ref: api.head.and_then(|head| head.ref_name),
            review_decision: api.review_decision,
            merged: api.merged,
            draft: api.draft,
            created_at: api.created_at,
            updated_at: api.updated_at,
            closed_at: api.closed_at,
            author_login: user.login,
            author_avatar_url: user.avatar_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiSubject {
    pub(crate) title: Option<String>,
    pub(crate) url: Option<String>,
    #[serde(rename = "type")]
    pub(crate) subject_type: Option<String>,
}

/// One element of `GET /notifications`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiNotification {
    #[serde(default)]
    pub(crate) subject: ApiSubject,
    pub(crate) updated_at: Option<String>,
}

impl From<ApiNotification> for NotificationThread {
    fn from(api: ApiNotification) -> Self {
        Self {
            subject_type: api.subject.subject_type,
            subject_url: api.subject.url,
            title: api.subject.title,
            updated_at: api.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiIssuePullRequest {
    pub(crate) merged_at: Option<String>,
}

/// One hit of `GET /search/issues`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiSearchIssue {
    pub(crate) html_url: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) number: Option<u64>,
    pub(crate) state: Option<String>,
    pub(crate) draft: Option<bool>,
    pub(crate) created_at: Option<String>,
    pub(crate) updated_at: Option<String>,
    pub(crate) closed_at: Option<String>,
    pub(crate) user: Option<ApiUser>,
    pub(crate) repository_url: Option<String>,
    pub(crate) pull_request: Option<ApiIssuePullRequest>,
}

impl From<ApiSearchIssue> for RawPullRequest {
    fn from(api: ApiSearchIssue) -> Self {
        let user = api.user.unwrap_or_default();
        let merged = api
            .pull_request
            .map(|pull_request| pull_request.merged_at.is_some());
        Self {
            url: api.html_url,
            title: api.title,
            number: api.number,
            state: api.state,
            repository: api.repository_url.as_deref().and_then(repository_from_api_url),
            head_ref: None,
            review_decision: None,
            merged,
            draft: api.draft,
            created_at: api.created_at,
            updated_at: api.updated_at,
            closed_at: api.closed_at,
            author_login: user.login,
            author_avatar_url: user.avatar_url,
        }
    }
}

/// `GET /search/issues` envelope.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiSearchResults {
    #[serde(default)]
    pub(crate) items: Vec<ApiSearchIssue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GhRepository {
    pub(crate) name_with_owner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GhAuthor {
    pub(crate) login: Option<String>,
}

/// One element of `gh search prs --json ...`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GhSearchHit {
    pub(crate) url: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) number: Option<u64>,
    pub(crate) state: Option<String>,
    pub(crate) repository: Option<GhRepository>,
    pub(crate) author: Option<GhAuthor>,
    pub(crate) is_draft: Option<bool>,
    pub(crate) created_at: Option<String>,
    pub(crate) updated_at: Option<String>,
    pub(crate) closed_at: Option<String>,
}

impl From<GhSearchHit> for RawPullRequest {
    fn from(hit: GhSearchHit) -> Self {
        Self {
            url: hit.url,
            title: hit.title,
            number: hit.number,
            state: hit.state,
            repository: hit.repository.and_then(|repo| repo.name_with_owner),
            head_ref: None,
            review_decision: None,
            merged: None,
            draft: hit.is_draft,
            created_at: hit.created_at,
            updated_at: hit.updated_at,
            closed_at: hit.closed_at,
            author_login: hit.author.and_then(|author| author.login),
            author_avatar_url: None,
        }
    }
}

/// Fields listed in `gh search prs --json`.
pub(crate) const GH_SEARCH_FIELDS: &str =
    "number,title,state,url,repository,author,updatedAt,createdAt,closedAt,isDraft";

/// Extracts `owner/name` from `.../repos/{owner}/{name}`.
fn repository_from_api_url(api_url: &str) -> Option<String> {
    let (_, tail) = api_url.rsplit_once("/repos/")?;
    let mut parts = tail.split('/');
    let owner = parts.next().filter(|segment| !segment.is_empty())?;
    let name = parts.next().filter(|segment| !segment.is_empty())?;
    Some(format!("{owner}/{name}"))
}
