//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, here always the control
//! surface server with its auth settings.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    auth, ARG_LISTEN, ARG_PORT, ARG_PRUNE_INTERVAL_SECONDS, ARG_REQUEST_TIMEOUT_SECONDS,
};
use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv6Addr};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let listen = matches
        .get_one::<IpAddr>(ARG_LISTEN)
        .copied()
        .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    let request_timeout_seconds = matches
        .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
        .copied()
        .context("missing required argument: --request-timeout-seconds")?;
    let prune_interval_seconds = matches
        .get_one::<u64>(ARG_PRUNE_INTERVAL_SECONDS)
        .copied()
        .context("missing required argument: --prune-interval-seconds")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        listen,
        request_timeout_seconds,
        prune_interval_seconds,
        users_file: auth_opts.users_file,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        cookie_ttl_seconds: auth_opts.cookie_ttl_seconds,
        cookie_secure: auth_opts.cookie_secure,
        login_max_attempts: auth_opts.login.max_attempts,
        login_block_seconds: auth_opts.login.block_seconds,
        login_max_block_seconds: auth_opts.login.max_block_seconds,
        trusted_proxies: auth_opts.trusted_proxies,
        public_paths: auth_opts.public_paths,
    }))
}
