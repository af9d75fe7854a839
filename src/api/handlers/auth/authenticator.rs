//! Login orchestration and per-request identity resolution.
//!
//! Flow Overview:
//! - `login`: limiter check, directory verification, limiter update, session
//!   issue. Blocked clients never reach the directory.
//! - `resolve`: bootstrap check, then session cookie, then HTTP Basic.
//!
//! Directory calls run on the blocking pool and never while a store or
//! limiter lock is held. If the caller drops the returned future (client
//! disconnect, request timeout) the pending lookup result is discarded.

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap,
};
use base64ct::{Base64, Encoding};
use secrecy::SecretString;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    directory::{DirectoryError, User, UserDirectory},
    rate_limit::RateLimiter,
    state::AuthConfig,
    store::{Session, SessionStore, SessionToken},
};

/// Message returned for every failed login, whether or not the name exists.
pub const INVALID_LOGIN_MESSAGE: &str = "invalid username or password";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("blocked for {}s", .0.as_secs())]
    RateLimited(Duration),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("session error: {0}")]
    Session(anyhow::Error),
}

/// User attached to an authenticated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self { login: user.login }
    }
}

/// Outcome of resolving a request's credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No users exist yet; authentication is not enforced.
    Bootstrap,
    Authenticated(Identity),
    Unauthenticated,
}

pub struct Authenticator {
    config: AuthConfig,
    sessions: SessionStore,
    rate_limiter: Arc<dyn RateLimiter>,
    directory: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
            rate_limiter,
            directory,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    /// Verify credentials for `client` and open a new session.
    ///
    /// # Errors
    /// `RateLimited` while `client` is blocked, `InvalidCredentials` on a bad
    /// name or password, `Directory`/`Session` on infrastructure failures.
    pub async fn login(
        &self,
        name: &str,
        password: SecretString,
        client: IpAddr,
    ) -> Result<Session, AuthError> {
        let wait = self.rate_limiter.check(client);
        if !wait.is_zero() {
            return Err(AuthError::RateLimited(wait));
        }

        let login = name.to_string();
        let user = self
            .with_directory(move |directory| directory.authenticate(&login, &password))
            .await?;

        let Some(user) = user else {
            self.rate_limiter.record_failure(client);
            return Err(AuthError::InvalidCredentials);
        };

        self.rate_limiter.record_success(client);
        self.sessions
            .issue(&user.login, self.config.session_ttl())
            .map_err(AuthError::Session)
    }

    /// Revoke the session named by a raw cookie value. Unknown or malformed
    /// values are ignored.
    pub fn logout(&self, cookie_value: &str) {
        if let Some(token) = SessionToken::decode(cookie_value) {
            self.sessions.revoke(&token);
        }
    }

    /// Whether authentication is currently enforced.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn auth_required(&self) -> Result<bool, AuthError> {
        let count = self.with_directory(|directory| directory.count()).await?;
        Ok(count > 0)
    }

    /// Resolve the caller behind `headers`.
    ///
    /// # Errors
    /// Returns an error only when the directory fails; missing or bad
    /// credentials resolve to [`Resolution::Unauthenticated`].
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Resolution, AuthError> {
        if !self.auth_required().await? {
            return Ok(Resolution::Bootstrap);
        }

        if let Some(value) = session_cookie_value(headers, self.config.cookie_name()) {
            return self.resolve_session(&value).await;
        }

        if let Some((login, password)) = basic_credentials(headers) {
            let user = self
                .with_directory(move |directory| directory.authenticate(&login, &password))
                .await?;
            return Ok(match user {
                Some(user) => Resolution::Authenticated(user.into()),
                None => {
                    debug!("invalid basic authorization value");
                    Resolution::Unauthenticated
                }
            });
        }

        Ok(Resolution::Unauthenticated)
    }

    /// Whether the request carries a live session for an existing user.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn has_valid_session(&self, headers: &HeaderMap) -> Result<bool, AuthError> {
        let Some(value) = session_cookie_value(headers, self.config.cookie_name()) else {
            return Ok(false);
        };
        Ok(matches!(
            self.resolve_session(&value).await?,
            Resolution::Authenticated(_)
        ))
    }

    async fn resolve_session(&self, value: &str) -> Result<Resolution, AuthError> {
        let Some(session) = self.sessions.lookup_encoded(value) else {
            debug!("invalid or expired session cookie");
            return Ok(Resolution::Unauthenticated);
        };

        let login = session.user_login().to_string();
        let user = self
            .with_directory(move |directory| directory.by_login(&login))
            .await?;
        Ok(user.map_or(Resolution::Unauthenticated, |user| {
            Resolution::Authenticated(user.into())
        }))
    }

    /// Run a directory call on the blocking pool.
    async fn with_directory<T, F>(&self, call: F) -> Result<T, AuthError>
    where
        F: FnOnce(&dyn UserDirectory) -> Result<T, DirectoryError> + Send + 'static,
        T: Send + 'static,
    {
        let directory = self.directory.clone();
        let result = tokio::task::spawn_blocking(move || call(directory.as_ref()))
            .await
            .map_err(DirectoryError::from)?;
        Ok(result?)
    }
}

/// Value of the named cookie, if present.
pub(crate) fn session_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
}

/// Decode `Authorization: Basic` credentials.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, SecretString)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = Base64::decode_vec(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_string(), SecretString::from(password.to_string())))
}
