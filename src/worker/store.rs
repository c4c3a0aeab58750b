//! The canonical, URL-keyed pull request set.

use std::collections::BTreeMap;

use crate::github::models::PullRequestRecord;

/// Result of upserting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The URL was not in the set.
    Inserted,
    /// The URL was present and a tracked field changed.
    Updated,
    /// The URL was present and nothing tracked changed.
    Unchanged,
}

impl UpsertOutcome {
    /// Returns true when subscribers must be told about the record.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Records keyed by canonical URL, in URL order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalSet {
    records: BTreeMap<String, PullRequestRecord>,
}

impl CanonicalSet {
    /// Builds a set from `records`; later duplicates replace earlier ones.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = PullRequestRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.url.clone(), record))
                .collect(),
        }
    }

    /// Inserts `record`, or replaces the stored record when
    /// [`PullRequestRecord::differs_from`] reports a change.
    pub fn upsert(&mut self, record: PullRequestRecord) -> UpsertOutcome {
        match self.records.get_mut(&record.url) {
            None => {
                self.records.insert(record.url.clone(), record);
                UpsertOutcome::Inserted
            }
            Some(existing) if existing.differs_from(&record) => {
                *existing = record;
                UpsertOutcome::Updated
            }
            Some(_) => UpsertOutcome::Unchanged,
        }
    }

    /// Copies every record.
    #[must_use]
    pub fn records(&self) -> Vec<PullRequestRecord> {
        self.records.values().cloned().collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
