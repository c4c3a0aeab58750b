//! CLI operation mode handlers.
//!
//! This module contains the implementations for the two operation modes:
//! - [`serve`]: run the aggregation worker behind the HTTP server
//! - [`watch`]: follow a running server and render the reduced view
//!
//! Output formatting utilities are in [`output`].

use pr_radar::client::ClientError;
use pr_radar::config::ConfigError;
use pr_radar::github::SourceError;
use thiserror::Error;

pub mod output;
pub mod serve;
pub mod watch;

/// Errors surfaced to the user by the binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The provider backend could not be set up.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The stream client could not be set up.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Terminal or socket I/O failed.
    #[error("I/O error: {message}")]
    Io {
        /// Underlying error message.
        message: String,
    },
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
