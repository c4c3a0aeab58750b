//! Serve mode: aggregation worker plus HTTP server.

use std::sync::Arc;

use pr_radar::config::Backend;
use pr_radar::github::{
    GhCliGateway, OctocrabQueryGateway, PersonalAccessToken, PullRequestQueries,
};
use pr_radar::server::{self, AppState};
use pr_radar::source::PullRequestSource;
use pr_radar::worker::PullRequestWorker;
use pr_radar::RadarConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::CliError;

/// Runs the worker and serves it until interrupted.
///
/// # Errors
///
/// Returns [`CliError::Config`] for unusable configuration,
/// [`CliError::Source`] when the API backend cannot be built and
/// [`CliError::Io`] when the listen address cannot be bound.
pub async fn run(config: &RadarConfig) -> Result<(), CliError> {
    config.validate()?;
    let addr = config.listen_addr()?;
    let queries = build_queries(config)?;
    let limiter = Arc::new(config.token_bucket()?);

    let worker = PullRequestWorker::new(
        PullRequestSource::new(queries, limiter),
        Arc::new(config.favorites_source()),
        config.worker_options(),
    );
    worker.ensure_started();

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let served = server::serve(addr, AppState::new(worker.clone()), shutdown).await;
    worker.shutdown().await;
    info!("shut down");
    served.map_err(CliError::from)
}

/// Builds the provider backend selected by `config`.
///
/// # Errors
///
/// Returns [`CliError::Config`] when the API backend has no token and
/// [`CliError::Source`] when the API client cannot be built.
pub fn build_queries(config: &RadarConfig) -> Result<Arc<dyn PullRequestQueries>, CliError> {
    match config.backend()? {
        Backend::GhCli => Ok(Arc::new(GhCliGateway::new(
            config.gh_path.clone(),
            config.command_timeout(),
        ))),
        Backend::Api => {
            let token = PersonalAccessToken::new(config.resolve_token()?)?;
            let gateway = OctocrabQueryGateway::for_token(&token, config.api_base.as_deref())?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Cancels `token` on Ctrl-C.
pub async fn cancel_on_ctrl_c(token: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for Ctrl-C");
        return;
    }
    info!("interrupt received; shutting down");
    token.cancel();
}
