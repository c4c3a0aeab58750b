//! Scenario state for client view BDD tests.

use pr_radar::client::ClientView;
use pr_radar::github::models::PullRequestRecord;
use pr_radar::github::models::test_support::record;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// State shared across steps in a client view scenario.
#[derive(ScenarioState, Default)]
pub(crate) struct ViewScenarioState {
    /// The reducer under test.
    pub(crate) view: Slot<ClientView>,
}

/// Converts whole seconds to Unix milliseconds.
pub(crate) const fn millis(seconds: u64) -> u64 {
    seconds.saturating_mul(1_000)
}

/// Creates `count` records in `acme/web`, numbered from 1.
pub(crate) fn records(count: u64) -> Vec<PullRequestRecord> {
    (1..=count).map(|number| record("acme/web", number)).collect()
}
