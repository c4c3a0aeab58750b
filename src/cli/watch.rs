//! Watch mode: follow a running server and render the reduced view.

use std::io;
use std::sync::Arc;

use pr_radar::RadarConfig;
use pr_radar::client::{EventStreamClient, SystemClock, ViewDriver, ViewQuery};
use pr_radar::config::ConfigError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CliError;
use super::output::{format_view, write_screen};
use super::serve::cancel_on_ctrl_c;

/// Follows the server at `watch_url` until interrupted, redrawing the
/// terminal whenever the rendered text changes.
///
/// # Errors
///
/// Returns [`CliError::Config`] for unusable configuration,
/// [`CliError::Client`] for an invalid server URL and [`CliError::Io`] when
/// the terminal cannot be written.
pub async fn run(config: &RadarConfig) -> Result<(), CliError> {
    config.validate()?;
    let base_url = config.watch_url.as_deref().ok_or_else(|| ConfigError::Invalid {
        field: "watch_url",
        message: "is required in watch mode".to_owned(),
    })?;
    let query = ViewQuery::new(config.search.clone().unwrap_or_default(), config.group_by()?);
    let client = EventStreamClient::new(base_url)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let (inputs, receiver) = mpsc::unbounded_channel();
    let (mut states, driver) = ViewDriver::new(Arc::new(SystemClock)).spawn(receiver, cancel.clone());
    let stream = tokio::spawn({
        let stream_cancel = cancel.clone();
        async move { client.run(inputs, stream_cancel).await }
    });

    let mut last_screen = String::new();
    let outcome = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
        }
        let screen = format_view(&states.borrow_and_update(), &query);
        if screen != last_screen {
            if let Err(error) = write_screen(&mut io::stdout().lock(), &screen) {
                break Err(CliError::from(error));
            }
            last_screen = screen;
        }
    };

    cancel.cancel();
    for (name, handle) in [("driver", driver), ("stream", stream)] {
        if let Err(error) = handle.await {
            warn!(task = name, %error, "watch task ended abnormally");
        }
    }
    outcome
}
