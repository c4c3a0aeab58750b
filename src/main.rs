//! pr-radar CLI entrypoint: serve the aggregation worker or watch a server.

use std::io::{self, Write};
use std::process::ExitCode;

use ortho_config::OrthoConfig;
use pr_radar::RadarConfig;
use pr_radar::config::{ConfigError, OperationMode};
use pr_radar::telemetry::init_tracing;

mod cli;

use cli::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CliError> {
    let config = load_config()?;

    match config.operation_mode() {
        OperationMode::Serve => cli::serve::run(&config).await,
        OperationMode::Watch => cli::watch::run(&config).await,
    }
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`ConfigError::Load`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<RadarConfig, ConfigError> {
    RadarConfig::load().map_err(|error| ConfigError::Load {
        message: error.to_string(),
    })
}
