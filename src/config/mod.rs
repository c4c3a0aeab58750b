//! Application configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in application defaults
//! 2. **Configuration file** – `.pr-radar.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `PR_RADAR_*`, plus the legacy
//!    `GITHUB_TOKEN` for the token
//! 4. **Command-line arguments** – `--listen-addr`, `--backend`, and friends
//!
//! # Configuration File
//!
//! ```toml
//! listen_addr = "127.0.0.1:3000"
//! backend = "gh"
//! favorites = "octo/widgets,acme/web"
//! repos_file = "/home/alice/.config/dashboard/repos.json"
//! poll_interval_ms = 1000
//! bucket_capacity = 20
//! ```

use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::client::GroupBy;
use crate::favorites::{FavoritesSource, MergedFavorites, StaticFavorites, TrackedReposFile};
use crate::limiter::{RequestKind, TokenBucket};
use crate::persistence::{SnapshotFile, default_snapshot_path};
use crate::telemetry::{NoopTelemetrySink, StderrJsonlTelemetrySink, TelemetrySink};
use crate::worker::{WorkerOptions, WorkerSettings};

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_BACKEND: &str = "gh";
const DEFAULT_GH_PATH: &str = "gh";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 5_000;
const DEFAULT_RATE_LIMIT_COOLDOWN_MS: u64 = 120_000;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 20;
const DEFAULT_BUCKET_CAPACITY: u32 = 20;
const DEFAULT_BUCKET_REFILL_PER_SECOND: u32 = 1;

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// ortho-config could not parse arguments or read a file.
    #[error("failed to load configuration: {message}")]
    Load {
        /// Loader message.
        message: String,
    },

    /// A value is present but unusable.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Configuration key.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The API backend was selected without a token.
    #[error("a GitHub token is required for the api backend (use --token, PR_RADAR_TOKEN or GITHUB_TOKEN)")]
    MissingToken,
}

/// Operation mode determined by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Run the worker and serve it over HTTP.
    Serve,
    /// Follow a running server's event stream in the terminal.
    Watch,
}

/// Which provider implementation the worker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Shell out to the `gh` CLI.
    GhCli,
    /// Call the GitHub REST API with a token.
    Api,
}

/// Application configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `PR_RADAR_LISTEN_ADDR` or `--listen-addr`: HTTP bind address
/// - `PR_RADAR_BACKEND` or `--backend`: `gh` or `api`
/// - `PR_RADAR_TOKEN`, `GITHUB_TOKEN`, or `--token`: token for `api`
/// - `PR_RADAR_FAVORITES` or `--favorites`: comma-separated repositories
/// - `PR_RADAR_WATCH_URL` or `--watch-url`: server to follow in watch mode
///
/// # Example
///
/// ```no_run
/// use ortho_config::OrthoConfig;
/// use pr_radar::RadarConfig;
///
/// let config = RadarConfig::load().expect("failed to load configuration");
/// config.validate().expect("configuration should be consistent");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "PR_RADAR",
    discovery(
        dotfile_name = ".pr-radar.toml",
        config_file_name = "pr-radar.toml",
        app_name = "pr-radar"
    )
)]
pub struct RadarConfig {
    /// Address the HTTP server binds in serve mode.
    #[ortho_config(cli_short = 'l')]
    pub listen_addr: String,

    /// Provider backend: `gh` (default) or `api`.
    #[ortho_config(cli_short = 'b')]
    pub backend: String,

    /// Path to the `gh` executable.
    #[ortho_config(cli_short = 'G')]
    pub gh_path: String,

    /// Personal access token for the `api` backend.
    #[ortho_config(cli_short = 't')]
    pub token: Option<String>,

    /// GitHub API base URL for the `api` backend (GitHub Enterprise).
    #[ortho_config()]
    pub api_base: Option<String>,

    /// Comma-separated `owner/name` repositories to follow.
    #[ortho_config(cli_short = 'f')]
    pub favorites: Option<String>,

    /// Tracked-repositories JSON file whose `favorite` entries are followed.
    #[ortho_config()]
    pub repos_file: Option<String>,

    /// Where the warm-start snapshot is persisted.
    ///
    /// Defaults to `pr-radar-snapshot.json` in the system temporary
    /// directory.
    #[ortho_config(cli_short = 'S')]
    pub snapshot_path: Option<String>,

    /// Pause between successful poll cycles, in milliseconds.
    #[ortho_config()]
    pub poll_interval_ms: u64,

    /// Pause after a failed poll cycle, in milliseconds.
    #[ortho_config()]
    pub error_backoff_ms: u64,

    /// Cooldown after a rate limit without a known reset time, in
    /// milliseconds.
    #[ortho_config()]
    pub rate_limit_cooldown_ms: u64,

    /// Per-command timeout for the `gh` backend, in seconds.
    #[ortho_config()]
    pub command_timeout_secs: u64,

    /// Token bucket capacity.
    #[ortho_config()]
    pub bucket_capacity: u32,

    /// Token bucket refill rate per second.
    #[ortho_config()]
    pub bucket_refill_per_second: u32,

    /// Tokens available at startup.
    #[ortho_config()]
    pub bucket_initial_tokens: u32,

    /// Writes cycle telemetry as JSON lines on stderr.
    ///
    /// Note: `ortho_config` does not load boolean values from the
    /// environment, so only the CLI flag and config file are honoured.
    #[ortho_config()]
    pub telemetry: bool,

    /// Base URL of a running server; selects watch mode.
    #[ortho_config(cli_short = 'w')]
    pub watch_url: Option<String>,

    /// Free-text filter applied in watch mode.
    #[ortho_config(cli_short = 's')]
    pub search: Option<String>,

    /// Grouping in watch mode: `none`, `repository` or `reason`.
    #[ortho_config(cli_short = 'g')]
    pub group_by: Option<String>,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_owned(),
            backend: DEFAULT_BACKEND.to_owned(),
            gh_path: DEFAULT_GH_PATH.to_owned(),
            token: None,
            api_base: None,
            favorites: None,
            repos_file: None,
            snapshot_path: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
            rate_limit_cooldown_ms: DEFAULT_RATE_LIMIT_COOLDOWN_MS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            bucket_refill_per_second: DEFAULT_BUCKET_REFILL_PER_SECOND,
            bucket_initial_tokens: 0,
            telemetry: false,
            watch_url: None,
            search: None,
            group_by: None,
        }
    }
}

impl RadarConfig {
    /// Determines the operation mode: watch when a watch URL is configured,
    /// serve otherwise.
    #[must_use]
    pub const fn operation_mode(&self) -> OperationMode {
        if self.watch_url.is_some() {
            OperationMode::Watch
        } else {
            OperationMode::Serve
        }
    }

    /// Checks that every configured value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first unusable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.operation_mode() {
            OperationMode::Serve => {
                self.listen_addr()?;
                self.backend()?;
                self.token_bucket()?;
                if self.bucket_capacity < RequestKind::max_cost() {
                    return Err(invalid(
                        "bucket_capacity",
                        format!(
                            "{} is below the largest request cost {}",
                            self.bucket_capacity,
                            RequestKind::max_cost()
                        ),
                    ));
                }
                require_positive("poll_interval_ms", self.poll_interval_ms)?;
                require_positive("error_backoff_ms", self.error_backoff_ms)?;
                require_positive("rate_limit_cooldown_ms", self.rate_limit_cooldown_ms)?;
                require_positive("command_timeout_secs", self.command_timeout_secs)?;
                if self.bucket_initial_tokens > self.bucket_capacity {
                    return Err(invalid(
                        "bucket_initial_tokens",
                        format!(
                            "{} exceeds bucket_capacity {}",
                            self.bucket_initial_tokens, self.bucket_capacity
                        ),
                    ));
                }
                if let Some(base) = self.api_base.as_deref() {
                    Url::parse(base).map_err(|error| invalid("api_base", error.to_string()))?;
                }
            }
            OperationMode::Watch => {
                if let Some(url) = self.watch_url.as_deref() {
                    Url::parse(url).map_err(|error| invalid("watch_url", error.to_string()))?;
                }
                self.group_by()?;
            }
        }
        Ok(())
    }

    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .trim()
            .parse()
            .map_err(|error: std::net::AddrParseError| invalid("listen_addr", error.to_string()))
    }

    /// Parses the backend selector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything but `gh` or `api`.
    pub fn backend(&self) -> Result<Backend, ConfigError> {
        match self.backend.trim().to_ascii_lowercase().as_str() {
            "gh" | "cli" => Ok(Backend::GhCli),
            "api" | "octocrab" => Ok(Backend::Api),
            other => Err(invalid(
                "backend",
                format!("'{other}' is not one of gh, api"),
            )),
        }
    }

    /// Resolves the token from configuration or the legacy `GITHUB_TOKEN`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingToken`] when no token source provides a
    /// value.
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        self.token
            .clone()
            .or_else(|| env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    /// Builds the request limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the capacity or refill rate is
    /// zero.
    pub fn token_bucket(&self) -> Result<TokenBucket, ConfigError> {
        let capacity = NonZeroU32::new(self.bucket_capacity)
            .ok_or_else(|| invalid("bucket_capacity", "must be greater than zero".to_owned()))?;
        let refill = NonZeroU32::new(self.bucket_refill_per_second).ok_or_else(|| {
            invalid(
                "bucket_refill_per_second",
                "must be greater than zero".to_owned(),
            )
        })?;
        Ok(TokenBucket::new(capacity, refill, self.bucket_initial_tokens))
    }

    /// Poll loop timing.
    #[must_use]
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            error_backoff: Duration::from_millis(self.error_backoff_ms),
            rate_limit_cooldown: Duration::from_millis(self.rate_limit_cooldown_ms),
            ..WorkerSettings::default()
        }
    }

    /// Worker construction options: timings, snapshot file and telemetry.
    #[must_use]
    pub fn worker_options(&self) -> WorkerOptions {
        let telemetry: Arc<dyn TelemetrySink> = if self.telemetry {
            Arc::new(StderrJsonlTelemetrySink)
        } else {
            Arc::new(NoopTelemetrySink)
        };
        WorkerOptions {
            settings: self.worker_settings(),
            snapshot_file: Some(self.snapshot_file()),
            telemetry,
        }
    }

    /// Per-command timeout for the `gh` backend.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Snapshot file used for persistence and warm start.
    #[must_use]
    pub fn snapshot_file(&self) -> SnapshotFile {
        SnapshotFile::new(
            self.snapshot_path
                .as_deref()
                .map_or_else(default_snapshot_path, Utf8PathBuf::from),
        )
    }

    /// Repositories listed in `favorites`, trimmed and without blanks.
    #[must_use]
    pub fn favorite_list(&self) -> Vec<String> {
        self.favorites
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Combines the static list and the tracked-repositories file.
    #[must_use]
    pub fn favorites_source(&self) -> MergedFavorites {
        let mut sources: Vec<Box<dyn FavoritesSource>> =
            vec![Box::new(StaticFavorites::new(self.favorite_list()))];
        if let Some(path) = self.repos_file.as_deref() {
            sources.push(Box::new(TrackedReposFile::new(path)));
        }
        MergedFavorites::new(sources)
    }

    /// Grouping for watch mode.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown grouping name.
    pub fn group_by(&self) -> Result<GroupBy, ConfigError> {
        self.group_by.as_deref().map_or(Ok(GroupBy::default()), |raw| {
            raw.parse()
                .map_err(|error: crate::client::UnknownGroupBy| invalid("group_by", error.to_string()))
        })
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { field, message }
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
