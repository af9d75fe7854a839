//! Access gate middleware.
//!
//! Flow Overview: every request is classified once by [`decide`] and then
//! admitted, redirected, or rejected by [`access_gate`]. Authenticated requests
//! carry an [`Identity`] extension for downstream handlers; bootstrap requests
//! carry none.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    authenticator::{AuthError, Identity, Resolution},
    client_ip::resolve_client_ip,
    public::{LANDING_PAGE, LOGIN_PAGE},
    state::AuthState,
};

/// Paths where an unauthenticated browser is sent to the login page instead
/// of receiving a bare 403.
const CHALLENGE_PATHS: [&str; 2] = ["/", "/index.html"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Public resource or login page without a live session.
    PublicBypass,
    /// No users configured; the request runs without identity.
    Bootstrap,
    Authenticated(Identity),
    /// Login page requested while already logged in.
    AlreadyLoggedIn,
    /// Unauthenticated browser navigation; redirect to the login page.
    Challenge,
    Rejected,
}

/// Classify a request.
///
/// # Errors
/// Returns an error when the user directory cannot be consulted.
pub async fn decide(
    state: &AuthState,
    path: &str,
    headers: &HeaderMap,
) -> Result<GateDecision, AuthError> {
    let authenticator = state.authenticator();

    if path == LOGIN_PAGE {
        return Ok(if authenticator.has_valid_session(headers).await? {
            GateDecision::AlreadyLoggedIn
        } else {
            GateDecision::PublicBypass
        });
    }

    if state.public().is_public(path) {
        return Ok(GateDecision::PublicBypass);
    }

    Ok(match authenticator.resolve(headers).await? {
        Resolution::Bootstrap => GateDecision::Bootstrap,
        Resolution::Authenticated(identity) => GateDecision::Authenticated(identity),
        Resolution::Unauthenticated if CHALLENGE_PATHS.contains(&path) => GateDecision::Challenge,
        Resolution::Unauthenticated => GateDecision::Rejected,
    })
}

pub async fn access_gate(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let decision = decide(&state, &path, request.headers()).await;

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| {
            resolve_client_ip(request.headers(), addr.ip(), state.trusted_proxies()).ip()
        });
    let client = client_label(client);
    let method = request.method().clone();

    match decision {
        Ok(GateDecision::PublicBypass | GateDecision::Bootstrap) => next.run(request).await,
        Ok(GateDecision::Authenticated(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(GateDecision::AlreadyLoggedIn) => found(LANDING_PAGE),
        Ok(GateDecision::Challenge) => {
            debug!("auth: ip {client}: redirected to login page");
            found(LOGIN_PAGE)
        }
        Ok(GateDecision::Rejected) => {
            debug!("auth: ip {client}: responded with forbidden to {method} {path}");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
        Err(err) => {
            error!("auth: ip {client}: resolving user for {method} {path}: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Client address for audit logs.
fn client_label(client: Option<IpAddr>) -> String {
    client.map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

/// Plain `302 Found` redirect.
pub(crate) fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}
