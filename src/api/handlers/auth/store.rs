//! In-memory session storage.
//!
//! Flow Overview: `issue` mints a random token bound to a login name and an
//! absolute expiry, `lookup` returns live sessions only (expired records are
//! dropped on sight), `revoke` removes a token. `prune` is called from the
//! background sweep so abandoned sessions do not accumulate.
//!
//! Security boundaries: tokens come from the OS RNG and are compared as raw
//! bytes via the map lookup; the expiry is fixed at issue time and never
//! extended in place.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Raw token length in bytes (128 bits of entropy).
pub const SESSION_TOKEN_LENGTH: usize = 16;

/// Longest lifetime accepted for a session or a login block (100 years).
pub const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + lifetime` with the lifetime capped at [`MAX_LIFETIME`].
pub(crate) fn deadline(now: Instant, lifetime: Duration) -> Instant {
    now.checked_add(lifetime.min(MAX_LIFETIME)).unwrap_or(now)
}

/// Opaque session credential.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; SESSION_TOKEN_LENGTH]);

impl SessionToken {
    fn generate() -> Result<Self> {
        let mut bytes = [0u8; SESSION_TOKEN_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .context("failed to generate session token")?;
        Ok(Self(bytes))
    }

    /// Decode a cookie value. Wrong alphabet or wrong length yields `None`.
    #[must_use]
    pub fn decode(value: &str) -> Option<Self> {
        let mut bytes = [0u8; SESSION_TOKEN_LENGTH];
        let decoded = Base64UrlUnpadded::decode(value.trim(), &mut bytes).ok()?;
        if decoded.len() != SESSION_TOKEN_LENGTH {
            return None;
        }
        Some(Self(bytes))
    }

    #[must_use]
    pub fn encode(&self) -> String {
        Base64UrlUnpadded::encode_string(&self.0)
    }
}

// Never print the raw token.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    token: SessionToken,
    user_login: String,
    expires_at: Instant,
}

impl Session {
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    #[must_use]
    pub fn user_login(&self) -> &str {
        &self.user_login
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionToken, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionToken, Session>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a new session for `user_login` valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if the OS random number generator fails.
    pub fn issue(&self, user_login: &str, ttl: Duration) -> Result<Session> {
        let mut token = SessionToken::generate()?;
        let mut sessions = self.sessions();
        while sessions.contains_key(&token) {
            token = SessionToken::generate()?;
        }

        let session = Session {
            token,
            user_login: user_login.to_string(),
            expires_at: deadline(Instant::now(), ttl),
        };
        sessions.insert(token, session.clone());
        Ok(session)
    }

    /// Return the live session for `token`, if any.
    #[must_use]
    pub fn lookup(&self, token: &SessionToken) -> Option<Session> {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let session = sessions.get(token)?.clone();
        if session.is_expired(now) {
            sessions.remove(token);
            return None;
        }
        Some(session)
    }

    /// Like [`SessionStore::lookup`] for a raw cookie value.
    #[must_use]
    pub fn lookup_encoded(&self, value: &str) -> Option<Session> {
        SessionToken::decode(value).and_then(|token| self.lookup(&token))
    }

    pub fn revoke(&self, token: &SessionToken) {
        self.sessions().remove(token);
    }

    /// Drop every expired session and return how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
