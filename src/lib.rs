//! # Warden (control surface authentication)
//!
//! `warden` guards the administrative HTTP surface of a self-hosted appliance.
//! It authenticates administrators, issues bounded-lifetime session cookies,
//! throttles brute-force login attempts per client address, and decides for
//! every request whether it may pass, must be redirected to the login page, or
//! is rejected.
//!
//! ## Sessions
//!
//! Session tokens are 128 bits from the OS RNG, encoded as unpadded URL-safe
//! base64 in the `warden_session` cookie. The server-side TTL and the cookie
//! `Max-Age` are independent settings; a session never outlives its server
//! record even when the browser keeps the cookie.
//!
//! ## Bootstrap mode
//!
//! While the user directory is empty no authentication is enforced. Handlers
//! can tell this apart from a real login: no `Identity` is attached.
//!
//! ## Trusted proxies
//!
//! Proxy headers (`CF-Connecting-IP`, `True-Client-IP`, `X-Real-IP`,
//! `X-Forwarded-For`) are only read when the TCP peer is inside a configured
//! trusted network. Login throttling is always keyed by the TCP peer.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
