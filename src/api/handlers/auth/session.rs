//! Login and logout endpoints for cookie sessions.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{
        header::{InvalidHeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA, RETRY_AFTER, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{
    authenticator::{session_cookie_value, AuthError, INVALID_LOGIN_MESSAGE},
    client_ip::resolve_client_ip,
    gate::found,
    public::LOGIN_PAGE,
    state::{AuthConfig, AuthState},
    store::Session,
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    name: String,
    #[schema(format = Password)]
    password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("name", &self.name)
            .field("password", &"***")
            .finish()
    }
}

#[utoipa::path(
    post,
    path = "/control/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set"),
        (status = 400, description = "Malformed body or unknown client address"),
        (status = 403, description = "Invalid username or password"),
        (status = 429, description = "Too many failed attempts, see Retry-After")
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "json decode: malformed login payload").into_response();
    };

    // Throttling is keyed by the TCP peer; proxy headers only feed the logs.
    let Some(ConnectInfo(peer)) = connect_info else {
        error!("auth: getting remote address: no peer address for login request");
        return (StatusCode::BAD_REQUEST, "auth: getting remote address").into_response();
    };
    let client = resolve_client_ip(&headers, peer.ip(), auth_state.trusted_proxies());

    let authenticator = auth_state.authenticator();
    match authenticator
        .login(
            &request.name,
            SecretString::from(request.password),
            client.peer(),
        )
        .await
    {
        Ok(session) => {
            info!(
                "auth: user {:?} successfully logged in from ip {}",
                request.name,
                client.ip()
            );
            login_response(auth_state.config(), &session)
        }
        Err(AuthError::RateLimited(wait)) => {
            warn!("auth: from ip {}: blocked for {}s", client.ip(), wait.as_secs());
            let mut response_headers = HeaderMap::new();
            response_headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds(wait)));
            (
                StatusCode::TOO_MANY_REQUESTS,
                response_headers,
                "Too Many Requests",
            )
                .into_response()
        }
        Err(AuthError::InvalidCredentials) => {
            warn!(
                "auth: from ip {}: {}",
                client.ip(),
                AuthError::InvalidCredentials
            );
            (StatusCode::FORBIDDEN, INVALID_LOGIN_MESSAGE).into_response()
        }
        Err(err) => {
            error!("auth: from ip {}: login failed: {err}", client.ip());
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/control/logout",
    responses(
        (status = 302, description = "Session cleared, redirect to the login page")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    let config = auth_state.config();
    let Some(value) = session_cookie_value(&headers, config.cookie_name()) else {
        return found(LOGIN_PAGE);
    };

    auth_state.authenticator().logout(&value);

    let mut response = found(LOGIN_PAGE);
    // Always clear the cookie, even if the session record was missing.
    match clear_session_cookie(config) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build logout cookie: {err}"),
    }
    response
}

fn login_response(config: &AuthConfig, session: &Session) -> Response {
    let cookie = match session_cookie(config, session) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    (StatusCode::OK, headers, "OK").into_response()
}

/// Whole seconds until the block ends, rounded up so clients never retry early.
fn retry_after_seconds(wait: Duration) -> u64 {
    let seconds = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

/// Build the `HttpOnly` session cookie. Its lifetime is the cookie TTL, not
/// the server-side session TTL.
pub(super) fn session_cookie(
    config: &AuthConfig,
    session: &Session,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name(),
        session.token().encode(),
        config.cookie_ttl().as_secs()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; SameSite=Lax",
        config.cookie_name()
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::super::store::SessionStore;
    use super::*;
    use anyhow::Result;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_seconds(Duration::from_secs(30)), 30);
        assert_eq!(retry_after_seconds(Duration::from_millis(29_001)), 30);
        assert_eq!(retry_after_seconds(Duration::from_millis(1)), 1);
    }

    #[tokio::test]
    async fn session_cookie_uses_cookie_ttl() -> Result<()> {
        let config = AuthConfig::new()
            .with_session_ttl(Duration::from_secs(60))
            .with_cookie_ttl(Duration::from_secs(3600));
        let session = SessionStore::new().issue("admin", config.session_ttl())?;

        let cookie = session_cookie(&config, &session)?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with(&format!("warden_session={}", session.token().encode())));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(!cookie.contains("Secure"));
        Ok(())
    }

    #[test]
    fn clear_cookie_expires_in_the_past() -> Result<()> {
        let config = AuthConfig::new().with_cookie_secure(true);
        let cookie = clear_session_cookie(&config)?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("warden_session=;"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn login_request_debug_hides_password() -> Result<()> {
        let request: LoginRequest =
            serde_json::from_str(r#"{"name":"admin","password":"hunter2"}"#)?;
        let printed = format!("{request:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
        Ok(())
    }
}
