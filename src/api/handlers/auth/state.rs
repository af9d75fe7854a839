//! Auth state and configuration.

use std::time::Duration;

use super::{authenticator::Authenticator, client_ip::TrustedProxies, public::PublicResources};

pub const SESSION_COOKIE_NAME: &str = "warden_session";

const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_COOKIE_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl: Duration,
    cookie_ttl: Duration,
    cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            cookie_ttl: Duration::from_secs(DEFAULT_COOKIE_TTL_SECONDS),
            cookie_secure: false,
        }
    }

    /// Server-side validity of a session.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Browser-side `Max-Age` of the session cookie.
    #[must_use]
    pub fn with_cookie_ttl(mut self, ttl: Duration) -> Self {
        self.cookie_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn cookie_ttl(&self) -> Duration {
        self.cookie_ttl
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_name(&self) -> &'static str {
        SESSION_COOKIE_NAME
    }
}

/// Shared auth service handed to every handler and the access gate.
pub struct AuthState {
    authenticator: Authenticator,
    public: PublicResources,
    trusted_proxies: TrustedProxies,
}

impl AuthState {
    pub fn new(
        authenticator: Authenticator,
        public: PublicResources,
        trusted_proxies: TrustedProxies,
    ) -> Self {
        Self {
            authenticator,
            public,
            trusted_proxies,
        }
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.authenticator.config()
    }

    #[must_use]
    pub fn public(&self) -> &PublicResources {
        &self.public
    }

    #[must_use]
    pub fn trusted_proxies(&self) -> &TrustedProxies {
        &self.trusted_proxies
    }
}
