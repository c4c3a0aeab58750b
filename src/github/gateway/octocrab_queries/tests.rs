//! Tests for the Octocrab query gateway.

use rstest::{fixture, rstest};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::OctocrabQueryGateway;
use crate::github::error::SourceError;
use crate::github::gateway::{PersonalAccessToken, PullRequestQueries, SearchQuery, UserQualifier};

const EXPECTED_RESET_AT: u64 = 1_700_000_000;

struct QueryGatewayFixture {
    runtime: Runtime,
    server: MockServer,
    gateway: OctocrabQueryGateway,
}

impl QueryGatewayFixture {
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn mount(&self, route: &str, response: ResponseTemplate) {
        self.block_on(
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(response)
                .mount(&self.server),
        );
    }
}

#[fixture]
fn token() -> PersonalAccessToken {
    PersonalAccessToken::new("valid-token").expect("token should be valid")
}

#[fixture]
fn gateway_fixture(token: PersonalAccessToken) -> QueryGatewayFixture {
    let runtime = Runtime::new().expect("runtime should start");
    let server = runtime.block_on(MockServer::start());
    let gateway = {
        let _guard = runtime.enter();
        OctocrabQueryGateway::for_token(&token, Some(&server.uri()))
            .expect("should create gateway")
    };
    QueryGatewayFixture {
        runtime,
        server,
        gateway,
    }
}

#[rstest]
fn viewer_login_reads_user_endpoint(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/user",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "login": "alice" })),
    );

    let login = gateway_fixture
        .block_on(gateway_fixture.gateway.viewer_login())
        .expect("login should resolve");

    assert_eq!(login, "alice");
}

#[rstest]
fn notifications_keep_subject_fields(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/notifications",
        ResponseTemplate::new(200).set_body_json(serde_json::json!([{
            "subject": {
                "type": "PullRequest",
                "title": "Fix flaky test",
                "url": "https://api.github.com/repos/octo/widgets/pulls/12"
            },
            "updated_at": "2025-01-02T00:00:00Z"
        }])),
    );

    let threads = gateway_fixture
        .block_on(gateway_fixture.gateway.notifications())
        .expect("notifications should decode");

    let thread = threads.first().expect("one thread");
    assert!(thread.is_pull_request());
    assert_eq!(thread.title.as_deref(), Some("Fix flaky test"));
}

#[rstest]
fn search_sends_pull_request_qualifier(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.block_on(
        Mock::given(method("GET"))
            .and(path("/search/issues"))
            .and(query_param("q", "is:pr state:open review-requested:alice"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_count": 1,
                "items": [{
                    "html_url": "https://github.com/octo/widgets/pull/4",
                    "title": "Add cache",
                    "number": 4,
                    "state": "open",
                    "user": { "login": "bob" },
                    "repository_url": "https://api.github.com/repos/octo/widgets",
                    "pull_request": { "merged_at": null }
                }]
            })))
            .mount(&gateway_fixture.server),
    );
    let query = SearchQuery::Involving {
        qualifier: UserQualifier::ReviewRequested,
        login: "alice".to_owned(),
    };

    let hits = gateway_fixture
        .block_on(gateway_fixture.gateway.search_pull_requests(&query))
        .expect("search should decode");

    let hit = hits.first().expect("one hit");
    assert_eq!(hit.repository.as_deref(), Some("octo/widgets"));
    assert_eq!(hit.merged, Some(false));
}

#[rstest]
fn pull_request_details_include_head_ref(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/repos/octo/widgets/pulls/4",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "number": 4,
            "title": "Add cache",
            "state": "open",
            "head": { "ref": "feature/cache" },
            "user": { "login": "bob" }
        })),
    );

    let details = gateway_fixture
        .block_on(gateway_fixture.gateway.pull_request("octo/widgets", 4))
        .expect("details should decode");

    assert_eq!(details.head_ref.as_deref(), Some("feature/cache"));
}

#[rstest]
fn rate_limit_error_includes_reset_time(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/notifications",
        ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "message": "API rate limit exceeded for user",
            "documentation_url": "https://docs.github.com/rest/rate-limit"
        })),
    );
    gateway_fixture.mount(
        "/rate_limit",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resources": {
                "core": { "limit": 5000, "used": 5000, "remaining": 0, "reset": EXPECTED_RESET_AT },
                "search": { "limit": 30, "used": 0, "remaining": 30, "reset": EXPECTED_RESET_AT }
            },
            "rate": { "limit": 5000, "used": 5000, "remaining": 0, "reset": EXPECTED_RESET_AT }
        })),
    );

    let error = gateway_fixture
        .block_on(gateway_fixture.gateway.notifications())
        .expect_err("request should fail");

    match error {
        SourceError::RateLimitExceeded {
            rate_limit,
            message,
        } => {
            let info = rate_limit.expect("expected rate_limit info to be populated");
            assert_eq!(info.reset_at(), EXPECTED_RESET_AT);
            assert!(
                message.contains("API rate limit exceeded for user"),
                "unexpected message: {message}"
            );
            assert!(
                message.contains("0 of 5000 requests left"),
                "quota should be reported: {message}"
            );
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[rstest]
fn unauthorised_responses_map_to_authentication_errors(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/user",
        ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "message": "Bad credentials",
            "documentation_url": "https://docs.github.com/rest"
        })),
    );

    let error = gateway_fixture
        .block_on(gateway_fixture.gateway.viewer_login())
        .expect_err("request should fail");

    assert!(
        matches!(error, SourceError::Authentication { .. }),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn unsearchable_repository_is_reported_as_inaccessible(gateway_fixture: QueryGatewayFixture) {
    gateway_fixture.mount(
        "/search/issues",
        ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "message": "Validation Failed",
            "errors": [{
                "message": "The listed users and repositories cannot be searched either because the resources do not exist or you do not have permission to view them.",
                "resource": "Search",
                "field": "q",
                "code": "invalid"
            }],
            "documentation_url": "https://docs.github.com/rest/search/search#search-issues-and-pull-requests"
        })),
    );
    let query = SearchQuery::Repository {
        repository: "ghost/missing".to_owned(),
    };

    let error = gateway_fixture
        .block_on(gateway_fixture.gateway.search_pull_requests(&query))
        .expect_err("search should fail");

    assert!(
        error.is_inaccessible_repository(),
        "unexpected error: {error}"
    );
    assert!(!error.aborts_cycle(), "unexpected error: {error}");
}

#[rstest]
fn validation_failure_without_details_keeps_top_level_message(
    gateway_fixture: QueryGatewayFixture,
) {
    gateway_fixture.mount(
        "/search/issues",
        ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "message": "Validation Failed"
        })),
    );
    let query = SearchQuery::Repository {
        repository: "octo/widgets".to_owned(),
    };

    let error = gateway_fixture
        .block_on(gateway_fixture.gateway.search_pull_requests(&query))
        .expect_err("search should fail");

    assert_eq!(
        error,
        SourceError::Api {
            message: "search pull requests failed with status 422 Unprocessable Entity: Validation Failed"
                .to_owned(),
        }
    );
}
