//! Session establishment with automatic registration fallback.
//!
//! Login first; a 403 means the homeserver does not accept these credentials,
//! which for a fresh username means "not registered yet". In that case the
//! same credentials are registered once and login is retried exactly once.
//! Any other login failure surfaces unchanged.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::wire::{self, LoginRequest, LoginResponse, RegisterRequest};
use crate::api::{ApiRequest, Transport};
use crate::error::{AuthError, TransportError};

/// An authenticated session. Immutable once established; token refresh is out
/// of scope, so an expired token means restarting the client.
#[derive(Debug, Clone)]
pub struct Session {
    pub homeserver: String,
    pub user_id: String,
    pub access_token: String,
    pub device_id: Option<String>,
}

/// Establish a session, registering the user first if needed.
pub async fn establish(
    transport: &dyn Transport,
    homeserver: &str,
    username: &str,
    password: &str,
) -> Result<Session, AuthError> {
    info!(username, "logging in");

    match login(transport, homeserver, username, password).await {
        Ok(session) => Ok(session),
        Err(TransportError::Api { status: 403, .. }) => {
            info!(username, "login rejected, trying to register a new user");
            register(transport, username, password).await?;
            // One retry; a second rejection here is a real credential problem.
            login(transport, homeserver, username, password)
                .await
                .map_err(AuthError::Login)
        }
        Err(err) => Err(AuthError::Login(err)),
    }
}

/// Best-effort logout. Called on shutdown; failures are logged, never fatal.
pub async fn logout(transport: &dyn Transport, session: &Session) {
    let req =
        ApiRequest::post(format!("{}/logout", wire::API_PREFIX), json!({})).auth(&session.access_token);
    match transport.request(req).await {
        Ok(_) => debug!("logged out"),
        Err(err) => warn!(error = %err, "logout failed"),
    }
}

async fn login(
    transport: &dyn Transport,
    homeserver: &str,
    username: &str,
    password: &str,
) -> Result<Session, TransportError> {
    let body = serde_json::to_value(LoginRequest::password(username, password))
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    let value = transport
        .request(ApiRequest::post(format!("{}/login", wire::API_PREFIX), body))
        .await?;
    let response: LoginResponse =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;

    info!(user_id = %response.user_id, "session established");

    Ok(Session {
        homeserver: homeserver.to_owned(),
        user_id: response.user_id,
        access_token: response.access_token,
        device_id: response.device_id,
    })
}

async fn register(
    transport: &dyn Transport,
    username: &str,
    password: &str,
) -> Result<(), AuthError> {
    let body = serde_json::to_value(RegisterRequest::dummy(username, password))
        .map_err(|e| TransportError::Decode(e.to_string()))?;
    let req = ApiRequest::post(format!("{}/register", wire::API_PREFIX), body);

    match transport.request(req).await {
        Ok(_) => Ok(()),
        Err(err) => Err(classify_registration_failure(err, username)),
    }
}

/// Map the server's registration rejection onto the distinct failure modes a
/// user can act on. None of these are retried.
fn classify_registration_failure(err: TransportError, username: &str) -> AuthError {
    match err.errcode() {
        Some("M_USER_IN_USE") | Some("M_EXCLUSIVE") => AuthError::UsernameTaken(username.to_owned()),
        Some("M_INVALID_USERNAME") => AuthError::UsernameInvalid(err.to_string()),
        Some("M_UNKNOWN") if err.to_string().to_lowercase().contains("captcha") => {
            AuthError::CaptchaRequired
        }
        _ => AuthError::Registration(err),
    }
}
