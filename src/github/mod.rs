//! GitHub pull request queries.
//!
//! This module defines the provider-neutral query surface used by the
//! aggregation worker, the two gateways that implement it (the `gh` CLI and
//! the REST API through Octocrab), and the models and errors they share.
//! Errors are mapped into [`SourceError`] so the worker can classify rate
//! limits without knowing which backend produced them.

pub mod error;
pub mod gateway;
pub mod models;
pub mod rate_limit;

pub use error::SourceError;
pub use gateway::{
    GhCliGateway, OctocrabQueryGateway, PersonalAccessToken, PullRequestQueries, SearchQuery,
    UserQualifier,
};
pub use models::{
    Author, DiscoveryReason, NotificationThread, PullRequestRecord, PullRequestRef,
    PullRequestState, RawPullRequest, ReviewDecision,
};
pub use rate_limit::RateLimitInfo;

#[cfg(test)]
pub use gateway::MockPullRequestQueries;
