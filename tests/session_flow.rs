//! Session establishment: login, the registration fallback, and logout.

mod common;

use common::{api_error, login_ok, MockTransport, Step};
use minimx::error::AuthError;
use minimx::session;
use serde_json::json;

const HOMESERVER: &str = "https://matrix.example.org";

#[tokio::test]
async fn login_succeeds_without_registration() {
    let transport = MockTransport::new();
    transport.expect("/login", Step::Ok(login_ok()));

    let session = session::establish(transport.as_ref(), HOMESERVER, "alice", "pw")
        .await
        .expect("session");

    assert_eq!(session.homeserver, HOMESERVER);
    assert_eq!(session.user_id, "@alice:example.org");
    assert_eq!(session.access_token, "syt_test_token");
    assert_eq!(session.device_id.as_deref(), Some("MINIMXDEV"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].path.ends_with("/login"));
    // Pre-session endpoint, no bearer token yet.
    assert!(requests[0].access_token.is_none());
}

#[tokio::test]
async fn forbidden_login_registers_once_then_retries_once() {
    let transport = MockTransport::new();
    transport.expect(
        "/login",
        Step::Err(api_error(403, "M_FORBIDDEN", "Invalid password")),
    );
    transport.expect("/login", Step::Ok(login_ok()));
    transport.expect("/register", Step::Ok(json!({"user_id": "@alice:example.org"})));

    let session = session::establish(transport.as_ref(), HOMESERVER, "alice", "pw")
        .await
        .expect("session after registration");
    assert_eq!(session.user_id, "@alice:example.org");

    let paths = transport.paths();
    assert_eq!(paths.len(), 3);
    assert!(paths[0].ends_with("/login"));
    assert!(paths[1].ends_with("/register"));
    assert!(paths[2].ends_with("/login"));
}

#[tokio::test]
async fn taken_username_surfaces_without_second_login() {
    let transport = MockTransport::new();
    transport.expect(
        "/login",
        Step::Err(api_error(403, "M_FORBIDDEN", "Invalid password")),
    );
    transport.expect(
        "/register",
        Step::Err(api_error(400, "M_USER_IN_USE", "User ID already taken")),
    );

    let err = session::establish(transport.as_ref(), HOMESERVER, "alice", "pw")
        .await
        .expect_err("registration must fail");
    assert!(matches!(err, AuthError::UsernameTaken(name) if name == "alice"));

    // No login retry after a failed registration.
    let paths = transport.paths();
    assert_eq!(paths.len(), 2);
    assert!(paths[1].ends_with("/register"));
}

#[tokio::test]
async fn non_forbidden_login_failure_never_registers() {
    let transport = MockTransport::new();
    transport.expect("/login", Step::Err(api_error(500, "M_UNKNOWN", "boom")));

    let err = session::establish(transport.as_ref(), HOMESERVER, "alice", "pw")
        .await
        .expect_err("login must fail");
    assert!(matches!(err, AuthError::Login(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn second_login_rejection_is_a_credential_error() {
    let transport = MockTransport::new();
    transport.expect(
        "/login",
        Step::Err(api_error(403, "M_FORBIDDEN", "Invalid password")),
    );
    transport.expect(
        "/login",
        Step::Err(api_error(403, "M_FORBIDDEN", "Invalid password")),
    );
    transport.expect("/register", Step::Ok(json!({"user_id": "@alice:example.org"})));

    let err = session::establish(transport.as_ref(), HOMESERVER, "alice", "pw")
        .await
        .expect_err("second login must fail");
    assert!(matches!(err, AuthError::Login(_)));
    // One fallback cycle, never a second registration.
    assert_eq!(transport.paths().len(), 3);
}

#[tokio::test]
async fn logout_carries_the_session_token() {
    let transport = MockTransport::new();
    transport.expect("/logout", Step::Ok(json!({})));

    session::logout(transport.as_ref(), &common::session()).await;

    let requests = transport.requests_to("/logout");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].access_token.as_deref(), Some("syt_test_token"));
}
