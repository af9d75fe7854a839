use crate::api::{
    self,
    handlers::auth::{
        AuthConfig, AuthState, Authenticator, BackoffRateLimiter, NoopRateLimiter,
        PublicResources, RateLimiter, StaticDirectory, TrustedProxies, UserDirectory,
    },
    ServerConfig,
};
use anyhow::{Context, Result};
use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub listen: IpAddr,
    pub request_timeout_seconds: u64,
    pub prune_interval_seconds: u64,
    pub users_file: Option<PathBuf>,
    pub session_ttl_seconds: u64,
    pub cookie_ttl_seconds: u64,
    pub cookie_secure: bool,
    pub login_max_attempts: u32,
    pub login_block_seconds: u64,
    pub login_max_block_seconds: u64,
    pub trusted_proxies: String,
    pub public_paths: Vec<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the auth configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let auth_state = Arc::new(auth_state(&args)?);

    api::new(
        ServerConfig {
            listen: args.listen,
            port: args.port,
            request_timeout: Duration::from_secs(args.request_timeout_seconds),
            prune_interval: Duration::from_secs(args.prune_interval_seconds),
        },
        auth_state,
    )
    .await
}

/// Build the shared auth service. Every pattern, CIDR and password hash is
/// validated here so bad configuration fails before the listener binds.
pub(crate) fn auth_state(args: &Args) -> Result<AuthState> {
    let directory = match &args.users_file {
        Some(path) => StaticDirectory::from_file(path)?,
        None => StaticDirectory::new()?,
    };
    let users = directory.count().context("Failed to count users")?;
    if users == 0 {
        warn!("No users configured, authentication is not enforced");
    } else {
        info!("Loaded {users} users");
    }

    let rate_limiter: Arc<dyn RateLimiter> = if args.login_max_attempts == 0 {
        warn!("Login throttling disabled");
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(BackoffRateLimiter::new(
            args.login_max_attempts,
            Duration::from_secs(args.login_block_seconds),
            Duration::from_secs(args.login_max_block_seconds),
        ))
    };

    let config = AuthConfig::new()
        .with_session_ttl(Duration::from_secs(args.session_ttl_seconds))
        .with_cookie_ttl(Duration::from_secs(args.cookie_ttl_seconds))
        .with_cookie_secure(args.cookie_secure);

    let trusted_proxies =
        TrustedProxies::parse(&args.trusted_proxies).context("Invalid --trusted-proxies")?;
    let public = PublicResources::new(&args.public_paths).context("Invalid --public-path")?;

    Ok(AuthState::new(
        Authenticator::new(config, rate_limiter, Arc::new(directory)),
        public,
        trusted_proxies,
    ))
}

fn log_startup_args(args: &Args) {
    info!(
        listen = %args.listen,
        port = args.port,
        users_file = ?args.users_file,
        session_ttl_seconds = args.session_ttl_seconds,
        cookie_ttl_seconds = args.cookie_ttl_seconds,
        cookie_secure = args.cookie_secure,
        login_max_attempts = args.login_max_attempts,
        trusted_proxies = %args.trusted_proxies,
        "starting warden"
    );
}
