//! pr-radar library crate: a live dashboard of GitHub pull requests.
//!
//! A single [`worker::PullRequestWorker`] polls GitHub through a
//! rate-limited [`source::PullRequestSource`], keeps a canonical set of
//! pull requests the viewer cares about, and pushes changes to subscribers.
//! The [`server`] module exposes the set over HTTP and Server-Sent Events;
//! the [`client`] module follows that stream and reduces it into a view.

pub mod client;
pub mod config;
pub mod favorites;
pub mod github;
pub mod limiter;
pub mod persistence;
pub mod server;
pub mod source;
pub mod telemetry;
pub mod worker;

pub use config::RadarConfig;
pub use github::{PullRequestQueries, PullRequestRecord, SourceError};
pub use worker::{PullRequestWorker, WorkerEvent, WorkerSnapshot, WorkerStatus};
