//! Control-surface authentication.
//!
//! This module owns everything between an inbound request and a handler:
//! client address resolution, login throttling, sessions, credential checks
//! against the user directory, and the access gate middleware.
//!
//! ## Login Throttling
//!
//! Failed logins are counted per TCP peer address. After the configured number
//! of consecutive failures the peer is blocked and the block doubles with every
//! further failure, up to a ceiling. A successful login clears the counter.
//! Proxy headers never influence the throttling key.
//!
//! ## Sessions
//!
//! Sessions live in memory only. A restart logs every administrator out.

mod authenticator;
mod client_ip;
pub(crate) mod directory;
pub(crate) mod gate;
mod public;
mod rate_limit;
pub(crate) mod session;
mod state;
mod store;

pub use authenticator::{AuthError, Authenticator, Identity, Resolution, INVALID_LOGIN_MESSAGE};
pub use client_ip::{resolve_client_ip, ClientIp, TrustedProxies, DEFAULT_TRUSTED_PROXIES};
pub use directory::{hash_password, DirectoryError, StaticDirectory, User, UserDirectory};
pub use gate::{access_gate, GateDecision};
pub use public::{PathPattern, PublicResources, DEFAULT_PUBLIC_PATHS, LANDING_PAGE, LOGIN_PAGE};
pub use rate_limit::{
    BackoffRateLimiter, NoopRateLimiter, RateLimiter, DEFAULT_BLOCK_DURATION,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BLOCK_DURATION,
};
pub use state::{AuthConfig, AuthState, SESSION_COOKIE_NAME};
pub use store::{Session, SessionStore, SessionToken, MAX_LIFETIME};

#[cfg(test)]
mod tests;
