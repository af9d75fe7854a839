//! Rate limiting primitives for the login flow.
//!
//! Flow Overview:
//! 1) Every failed login from a client address bumps its failure counter.
//! 2) Once the counter reaches `max_attempts` the address is blocked; each
//!    further failure doubles the block, capped at `max_block_duration`.
//! 3) A successful login clears the entry for that address.
//!
//! Keys are always the TCP peer address, never a proxy-supplied header.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::store::deadline;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_BLOCK_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

pub trait RateLimiter: Send + Sync {
    /// Remaining block time for `key`; zero when a login may be attempted.
    fn check(&self, key: IpAddr) -> Duration;
    fn record_failure(&self, key: IpAddr);
    fn record_success(&self, key: IpAddr);
    /// Drop stale entries, returning how many were removed.
    fn prune(&self) -> usize;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _key: IpAddr) -> Duration {
        Duration::ZERO
    }

    fn record_failure(&self, _key: IpAddr) {}

    fn record_success(&self, _key: IpAddr) {}

    fn prune(&self) -> usize {
        0
    }
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    failures: u32,
    blocked_until: Option<Instant>,
    last_failure: Instant,
}

#[derive(Debug)]
pub struct BackoffRateLimiter {
    max_attempts: u32,
    block_duration: Duration,
    max_block_duration: Duration,
    entries: Mutex<HashMap<IpAddr, Entry>>,
}

impl BackoffRateLimiter {
    /// `max_attempts` must be non-zero; use [`NoopRateLimiter`] to disable
    /// throttling.
    #[must_use]
    pub fn new(max_attempts: u32, block_duration: Duration, max_block_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            block_duration,
            max_block_duration: max_block_duration.max(block_duration),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<IpAddr, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block length after `failures` consecutive failures.
    fn backoff(&self, failures: u32) -> Option<Duration> {
        let over = failures.checked_sub(self.max_attempts)?;
        let factor = 1u32.checked_shl(over).unwrap_or(u32::MAX);
        let block = self
            .block_duration
            .checked_mul(factor)
            .unwrap_or(self.max_block_duration);
        Some(block.min(self.max_block_duration))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BackoffRateLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            DEFAULT_BLOCK_DURATION,
            DEFAULT_MAX_BLOCK_DURATION,
        )
    }
}

impl RateLimiter for BackoffRateLimiter {
    fn check(&self, key: IpAddr) -> Duration {
        let now = Instant::now();
        self.entries()
            .get(&key)
            .and_then(|entry| entry.blocked_until)
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now))
    }

    fn record_failure(&self, key: IpAddr) {
        let now = Instant::now();
        let mut entries = self.entries();
        let entry = entries.entry(key).or_insert(Entry {
            failures: 0,
            blocked_until: None,
            last_failure: now,
        });
        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = now;
        if let Some(block) = self.backoff(entry.failures) {
            entry.blocked_until = Some(deadline(now, block));
        }
    }

    fn record_success(&self, key: IpAddr) {
        self.entries().remove(&key);
    }

    fn prune(&self) -> usize {
        let now = Instant::now();
        let retention = self.block_duration;
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| {
            let blocked = entry.blocked_until.is_some_and(|until| until > now);
            blocked || now.saturating_duration_since(entry.last_failure) < retention
        });
        before - entries.len()
    }
}
