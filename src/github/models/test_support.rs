//! Test helpers for constructing `PullRequestRecord` fixtures.
//!
//! # Examples
//!
//! ```
//! use pr_radar::github::models::test_support::record;
//!
//! let pr = record("octo/widgets", 1);
//! assert_eq!(pr.url, "https://github.com/octo/widgets/pull/1");
//! ```

use chrono::{DateTime, TimeZone, Utc};

use super::{
    Author, DiscoveryReason, PullRequestRecord, PullRequestState, RawPullRequest, ReviewDecision,
};

/// Fixed timestamp used by fixtures: 2025-01-01T00:00:00Z plus `offset_secs`.
#[must_use]
pub fn fixture_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600_i64.saturating_add(offset_secs), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Constructs an open record authored by `alice` and discovered as `Author`.
#[must_use]
pub fn record(repository: &str, number: u64) -> PullRequestRecord {
    PullRequestRecord {
        title: format!("Change #{number}"),
        url: format!("https://github.com/{repository}/pull/{number}"),
        state: PullRequestState::Open,
        repository: repository.to_owned(),
        number,
        head_ref: format!("feature/{number}"),
        review_decision: None,
        merged: false,
        draft: false,
        created_at: fixture_time(0),
        updated_at: fixture_time(0),
        closed_at: None,
        author: Author {
            login: "alice".to_owned(),
            avatar_url: None,
        },
        reason: DiscoveryReason::Author,
    }
}

/// Clones `base` with a new update timestamp.
#[must_use]
pub fn updated(base: &PullRequestRecord, offset_secs: i64) -> PullRequestRecord {
    PullRequestRecord {
        updated_at: fixture_time(offset_secs),
        ..base.clone()
    }
}

/// Clones `base` with a new review decision.
#[must_use]
pub fn reviewed(base: &PullRequestRecord, decision: ReviewDecision) -> PullRequestRecord {
    PullRequestRecord {
        review_decision: Some(decision),
        ..base.clone()
    }
}

/// Raw open search hit for `repository#number`.
#[must_use]
pub fn raw_hit(repository: &str, number: u64) -> RawPullRequest {
    RawPullRequest {
        url: Some(format!("https://github.com/{repository}/pull/{number}")),
        title: Some(format!("Change #{number}")),
        number: Some(number),
        state: Some("OPEN".to_owned()),
        repository: Some(repository.to_owned()),
        updated_at: Some(fixture_time(0).to_rfc3339()),
        created_at: Some(fixture_time(0).to_rfc3339()),
        author_login: Some("alice".to_owned()),
        ..RawPullRequest::default()
    }
}
