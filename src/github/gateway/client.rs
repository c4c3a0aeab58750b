//! Octocrab client construction and token handling.

use http::Uri;
use octocrab::Octocrab;

use crate::github::error::SourceError;

use super::error_mapping::map_octocrab_error;

/// Default REST API base URL.
pub(crate) const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Personal access token used to authenticate with GitHub.
#[derive(Clone, PartialEq, Eq)]
pub struct PersonalAccessToken(String);

impl PersonalAccessToken {
    /// Validates that the token is non-empty and trims whitespace.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::MissingToken` when the supplied string is blank.
    pub fn new(token: impl AsRef<str>) -> Result<Self, SourceError> {
        let trimmed = token.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SourceError::MissingToken);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the token value.
    #[must_use]
    pub const fn value(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for PersonalAccessToken {
    fn as_ref(&self) -> &str {
        self.value()
    }
}

impl std::fmt::Debug for PersonalAccessToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("PersonalAccessToken(***)")
    }
}

/// Builds an Octocrab client for the given token and API base URL.
///
/// # Errors
///
/// Returns `SourceError::Configuration` when the base URI cannot be parsed
/// or `SourceError::Api` when Octocrab fails to construct a client.
pub(super) fn build_octocrab_client(
    token: &PersonalAccessToken,
    api_base: &str,
) -> Result<Octocrab, SourceError> {
    let base_uri: Uri = api_base
        .parse::<Uri>()
        .map_err(|error| SourceError::Configuration {
            message: format!("invalid API base `{api_base}`: {error}"),
        })?;

    Octocrab::builder()
        .personal_token(token.as_ref())
        .base_uri(base_uri)
        .map_err(|error| SourceError::Api {
            message: format!("build client failed: {error}"),
        })?
        .build()
        .map_err(|error| map_octocrab_error("build client", &error))
}
