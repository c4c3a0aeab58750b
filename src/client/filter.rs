//! Search, grouping and summary counts for rendered records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::github::models::{PullRequestRecord, PullRequestState, ReviewDecision};

/// Label of the single group produced by [`GroupBy::None`].
pub const UNGROUPED_LABEL: &str = "All Pull Requests";

/// How records are grouped for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One group holding everything.
    None,
    /// One group per repository.
    #[default]
    Repository,
    /// One group per discovery reason.
    Reason,
}

impl GroupBy {
    fn label(self, record: &PullRequestRecord) -> String {
        match self {
            Self::None => UNGROUPED_LABEL.to_owned(),
            Self::Repository => record.repository.clone(),
            Self::Reason => record.reason.label().to_owned(),
        }
    }
}

/// Error returned when parsing an unknown grouping name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown grouping '{0}': expected none, repository or reason")]
pub struct UnknownGroupBy(String);

impl FromStr for GroupBy {
    type Err = UnknownGroupBy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "repository" | "repo" => Ok(Self::Repository),
            "reason" => Ok(Self::Reason),
            other => Err(UnknownGroupBy(other.to_owned())),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Repository => "repository",
            Self::Reason => "reason",
        })
    }
}

/// A labelled run of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordGroup {
    /// Group heading.
    pub label: String,
    /// Records, most recently updated first.
    pub records: Vec<PullRequestRecord>,
}

/// Filter and grouping applied to the rendered record list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    search: String,
    open_only: bool,
    group_by: GroupBy,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            open_only: true,
            group_by: GroupBy::default(),
        }
    }
}

impl ViewQuery {
    /// Creates a query with the given free-text search and grouping that
    /// keeps only open, unmerged records.
    #[must_use]
    pub fn new(search: impl Into<String>, group_by: GroupBy) -> Self {
        Self {
            search: search.into().trim().to_lowercase(),
            open_only: true,
            group_by,
        }
    }

    /// Keeps closed and merged records as well.
    #[must_use]
    pub const fn including_closed(mut self) -> Self {
        self.open_only = false;
        self
    }

    /// Grouping in effect.
    #[must_use]
    pub const fn group_by(&self) -> GroupBy {
        self.group_by
    }

    /// Returns true when `record` passes the state filter and the search.
    ///
    /// The search is a case-insensitive substring match against the title,
    /// repository, head ref, author login and number.
    #[must_use]
    pub fn matches(&self, record: &PullRequestRecord) -> bool {
        if self.open_only && !record.is_open_and_unmerged() {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        [
            record.title.as_str(),
            record.repository.as_str(),
            record.head_ref.as_str(),
            record.author.login.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&self.search))
            || record.number.to_string().contains(&self.search)
    }

    /// Filters and groups `records`. Groups are ordered by label and
    /// records within a group by update time, newest first. No groups are
    /// returned when nothing matches.
    #[must_use]
    pub fn apply(&self, records: &[PullRequestRecord]) -> Vec<RecordGroup> {
        let mut grouped: BTreeMap<String, Vec<PullRequestRecord>> = BTreeMap::new();
        for record in records.iter().filter(|record| self.matches(record)) {
            grouped
                .entry(self.group_by.label(record))
                .or_default()
                .push(record.clone());
        }

        grouped
            .into_iter()
            .map(|(label, mut members)| {
                members.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                RecordGroup {
                    label,
                    records: members,
                }
            })
            .collect()
    }
}

/// Summary counts over every record, regardless of filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewStats {
    /// All records.
    pub total: usize,
    /// Open and not draft.
    pub ready: usize,
    /// Drafts.
    pub draft: usize,
    /// Awaiting a required review.
    pub review_required: usize,
    /// Changes requested.
    pub changes_requested: usize,
    /// Approved.
    pub approved: usize,
}

impl ViewStats {
    /// Counts `records`.
    #[must_use]
    pub fn from_records(records: &[PullRequestRecord]) -> Self {
        records.iter().fold(Self::default(), |mut stats, record| {
            stats.total += 1;
            if record.draft {
                stats.draft += 1;
            } else if record.state == PullRequestState::Open {
                stats.ready += 1;
            }
            match record.review_decision {
                Some(ReviewDecision::ReviewRequired) => stats.review_required += 1,
                Some(ReviewDecision::ChangesRequested) => stats.changes_requested += 1,
                Some(ReviewDecision::Approved) => stats.approved += 1,
                None => {}
            }
            stats
        })
    }
}
