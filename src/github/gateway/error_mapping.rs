//! Error mapping helpers for the Octocrab gateway.

use http::StatusCode;

use crate::github::error::SourceError;

/// Checks if a GitHub error status indicates an authentication failure.
pub(super) const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Checks if an octocrab error represents a network/transport issue.
pub(super) const fn is_network_error(error: &octocrab::Error) -> bool {
    matches!(
        error,
        octocrab::Error::Http { .. }
            | octocrab::Error::Hyper { .. }
            | octocrab::Error::Service { .. }
    )
}

/// Checks whether the GitHub error represents a rate limit error based on the
/// HTTP status and message / documentation URL content.
pub(super) fn is_rate_limit_error(source: &octocrab::GitHubError) -> bool {
    let is_rate_limit_status = matches!(
        source.status_code,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    );

    let message_indicates_rate_limit = source.message.to_lowercase().contains("rate limit")
        || source
            .documentation_url
            .as_deref()
            .is_some_and(|url| url.contains("rate-limit"));

    is_rate_limit_status && message_indicates_rate_limit
}

/// Joins the top-level GitHub message with the messages in its `errors`
/// array, where validation failures put the actual reason.
pub(super) fn github_error_text(source: &octocrab::GitHubError) -> String {
    let details: Vec<&str> = source
        .errors
        .iter()
        .flatten()
        .filter_map(|detail| detail.get("message").and_then(serde_json::Value::as_str))
        .collect();
    if details.is_empty() {
        source.message.clone()
    } else {
        format!("{} ({})", source.message, details.join("; "))
    }
}

pub(super) fn map_octocrab_error(operation: &str, error: &octocrab::Error) -> SourceError {
    if let octocrab::Error::GitHub { source, .. } = error {
        let message = github_error_text(source);
        return if is_auth_failure(source.status_code) {
            SourceError::Authentication {
                message: format!(
                    "{operation} failed: GitHub returned {status} {message}",
                    status = source.status_code,
                ),
            }
        } else {
            SourceError::Api {
                message: format!(
                    "{operation} failed with status {status}: {message}",
                    status = source.status_code,
                ),
            }
        };
    }

    if is_network_error(error) {
        return SourceError::Network {
            message: format!("{operation} failed: {error}"),
        };
    }

    SourceError::Api {
        message: format!("{operation} failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use rstest::rstest;

    use super::is_auth_failure;

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED, true)]
    #[case(StatusCode::FORBIDDEN, true)]
    #[case(StatusCode::UNPROCESSABLE_ENTITY, false)]
    fn auth_failure_statuses(#[case] status: StatusCode, #[case] expected: bool) {
        assert_eq!(is_auth_failure(status), expected);
    }
}
