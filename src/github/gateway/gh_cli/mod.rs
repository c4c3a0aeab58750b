//! Gateway backed by the `gh` command-line client.
//!
//! Every query runs `gh` as a child process with a timeout. The child is
//! killed if the future is dropped, so cancelling a cycle never leaves
//! stray processes behind.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::github::error::SourceError;
use crate::github::models::wire::{
    ApiNotification, ApiPullRequest, GH_SEARCH_FIELDS, GhSearchHit,
};
use crate::github::models::{NotificationThread, RawPullRequest};

use super::{PullRequestQueries, SearchQuery};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

/// `gh`-backed implementation of [`PullRequestQueries`].
#[derive(Debug, Clone)]
pub struct GhCliGateway {
    program: String,
    timeout: Duration,
}

impl Default for GhCliGateway {
    fn default() -> Self {
        Self::new("gh", DEFAULT_COMMAND_TIMEOUT)
    }
}

impl GhCliGateway {
    /// Creates a gateway running `program` with the given per-command
    /// timeout.
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Runs `gh` with `args` and returns its standard output.
    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, SourceError> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command_line, "running gh");

        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return Err(SourceError::CommandFailed {
                    command: command_line,
                    message: error.to_string(),
                });
            }
            Err(_) => {
                return Err(SourceError::CommandTimedOut {
                    command: command_line,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let message = if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        };
        Err(classify_command_failure(command_line, message))
    }
}

/// Maps a failed `gh` invocation, recognising GitHub's rate-limit wording.
fn classify_command_failure(command: String, message: String) -> SourceError {
    if message.to_lowercase().contains("rate limit") {
        SourceError::RateLimitExceeded {
            rate_limit: None,
            message: format!("`{command}`: {message}"),
        }
    } else {
        SourceError::CommandFailed { command, message }
    }
}

/// Decodes `gh api --paginate` output, which concatenates one JSON array
/// per page.
fn decode_pages<T>(operation: &str, stdout: &[u8]) -> Result<Vec<T>, SourceError>
where
    T: serde::de::DeserializeOwned,
{
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_slice(stdout).into_iter::<Vec<T>>() {
        items.extend(page.map_err(|error| SourceError::decode(operation, &error))?);
    }
    Ok(items)
}

#[async_trait]
impl PullRequestQueries for GhCliGateway {
    async fn viewer_login(&self) -> Result<String, SourceError> {
        let stdout = self.run(&["api", "user", "--jq", ".login"]).await?;
        let login = String::from_utf8_lossy(&stdout).trim().to_owned();
        if login.is_empty() {
            return Err(SourceError::Decode {
                operation: "viewer login".to_owned(),
                message: "gh returned an empty login".to_owned(),
            });
        }
        Ok(login)
    }

    async fn notifications(&self) -> Result<Vec<NotificationThread>, SourceError> {
        let stdout = self.run(&["api", "notifications", "--paginate"]).await?;
        let threads: Vec<ApiNotification> = decode_pages("notifications", &stdout)?;
        Ok(threads.into_iter().map(NotificationThread::from).collect())
    }

    async fn search_pull_requests(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<RawPullRequest>, SourceError> {
        let limit = query.limit().to_string();
        let stdout = match query {
            SearchQuery::Involving { .. } => {
                let terms = query.terms();
                self.run(&[
                    "search",
                    "prs",
                    terms.as_str(),
                    "--limit",
                    limit.as_str(),
                    "--json",
                    GH_SEARCH_FIELDS,
                ])
                .await?
            }
            SearchQuery::Repository { repository } => {
                self.run(&[
                    "search",
                    "prs",
                    "--repo",
                    repository.as_str(),
                    "--state",
                    "open",
                    "--limit",
                    limit.as_str(),
                    "--json",
                    GH_SEARCH_FIELDS,
                ])
                .await?
            }
        };

        let hits: Vec<GhSearchHit> = serde_json::from_slice(&stdout)
            .map_err(|error| SourceError::decode("search prs", &error))?;
        Ok(hits.into_iter().map(RawPullRequest::from).collect())
    }

    async fn pull_request(
        &self,
        repository: &str,
        number: u64,
    ) -> Result<RawPullRequest, SourceError> {
        let path = format!("repos/{repository}/pulls/{number}");
        let stdout = self.run(&["api", path.as_str()]).await?;
        let details: ApiPullRequest = serde_json::from_slice(&stdout)
            .map_err(|error| SourceError::decode("pull request details", &error))?;
        Ok(details.into())
    }
}
