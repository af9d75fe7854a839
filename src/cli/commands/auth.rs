use crate::api::handlers::auth::{DEFAULT_TRUSTED_PROXIES, MAX_LIFETIME};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_USERS_FILE: &str = "users-file";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_TTL_SECONDS: &str = "cookie-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_LOGIN_MAX_ATTEMPTS: &str = "login-max-attempts";
pub const ARG_LOGIN_BLOCK_SECONDS: &str = "login-block-seconds";
pub const ARG_LOGIN_MAX_BLOCK_SECONDS: &str = "login-max-block-seconds";
pub const ARG_TRUSTED_PROXIES: &str = "trusted-proxies";
pub const ARG_PUBLIC_PATH: &str = "public-path";

#[derive(Debug)]
pub struct Options {
    pub users_file: Option<PathBuf>,
    pub session_ttl_seconds: u64,
    pub cookie_ttl_seconds: u64,
    pub cookie_secure: bool,
    pub login: LoginOptions,
    pub trusted_proxies: String,
    pub public_paths: Vec<String>,
}

#[derive(Debug)]
pub struct LoginOptions {
    pub max_attempts: u32,
    pub block_seconds: u64,
    pub max_block_seconds: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a TTL or block duration is zero, or the block
    /// ceiling is below the base block.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| matches.get_one::<u64>(id).copied().unwrap_or(0);

        let session_ttl_seconds = seconds(ARG_SESSION_TTL_SECONDS);
        let cookie_ttl_seconds = seconds(ARG_COOKIE_TTL_SECONDS);
        if session_ttl_seconds == 0 {
            anyhow::bail!("--{ARG_SESSION_TTL_SECONDS} must be greater than zero");
        }
        if cookie_ttl_seconds == 0 {
            anyhow::bail!("--{ARG_COOKIE_TTL_SECONDS} must be greater than zero");
        }

        let login = LoginOptions {
            max_attempts: matches
                .get_one::<u32>(ARG_LOGIN_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(0),
            block_seconds: seconds(ARG_LOGIN_BLOCK_SECONDS),
            max_block_seconds: seconds(ARG_LOGIN_MAX_BLOCK_SECONDS),
        };
        if login.max_attempts > 0 {
            if login.block_seconds == 0 {
                anyhow::bail!("--{ARG_LOGIN_BLOCK_SECONDS} must be greater than zero");
            }
            if login.max_block_seconds < login.block_seconds {
                anyhow::bail!(
                    "--{ARG_LOGIN_MAX_BLOCK_SECONDS} must not be lower than --{ARG_LOGIN_BLOCK_SECONDS}"
                );
            }
        }

        Ok(Self {
            users_file: matches
                .get_one::<String>(ARG_USERS_FILE)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            session_ttl_seconds,
            cookie_ttl_seconds,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            login,
            trusted_proxies: matches
                .get_one::<String>(ARG_TRUSTED_PROXIES)
                .cloned()
                .unwrap_or_default(),
            public_paths: matches
                .get_many::<String>(ARG_PUBLIC_PATH)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_login_args(command);
    with_access_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_USERS_FILE)
                .long(ARG_USERS_FILE)
                .help("JSON file with administrators and their argon2 password hashes")
                .long_help(
                    "JSON file with administrators and their argon2 password hashes. Without it, or with an empty user list, authentication is not enforced.",
                )
                .env("WARDEN_USERS_FILE"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Server-side session lifetime in seconds")
                .env("WARDEN_SESSION_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64).range(..=MAX_LIFETIME.as_secs())),
        )
        .arg(
            Arg::new(ARG_COOKIE_TTL_SECONDS)
                .long(ARG_COOKIE_TTL_SECONDS)
                .help("Max-Age of the session cookie in seconds")
                .env("WARDEN_COOKIE_TTL_SECONDS")
                .default_value("31536000")
                .value_parser(clap::value_parser!(u64).range(..=MAX_LIFETIME.as_secs())),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (HTTPS only)")
                .env("WARDEN_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}

fn with_login_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_MAX_ATTEMPTS)
                .long(ARG_LOGIN_MAX_ATTEMPTS)
                .help("Failed logins allowed per client before blocking, 0 disables throttling")
                .env("WARDEN_LOGIN_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOGIN_BLOCK_SECONDS)
                .long(ARG_LOGIN_BLOCK_SECONDS)
                .help("First block duration in seconds, doubled on every further failure")
                .env("WARDEN_LOGIN_BLOCK_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(..=MAX_LIFETIME.as_secs())),
        )
        .arg(
            Arg::new(ARG_LOGIN_MAX_BLOCK_SECONDS)
                .long(ARG_LOGIN_MAX_BLOCK_SECONDS)
                .help("Upper bound for the block duration in seconds")
                .env("WARDEN_LOGIN_MAX_BLOCK_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(..=MAX_LIFETIME.as_secs())),
        )
}

fn with_access_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TRUSTED_PROXIES)
                .long(ARG_TRUSTED_PROXIES)
                .help("Comma separated CIDRs allowed to set client IP headers, empty trusts none")
                .env("WARDEN_TRUSTED_PROXIES")
                .default_value(DEFAULT_TRUSTED_PROXIES),
        )
        .arg(
            Arg::new(ARG_PUBLIC_PATH)
                .long(ARG_PUBLIC_PATH)
                .help("Extra path served without authentication, e.g. /docs/* (repeatable)")
                .env("WARDEN_PUBLIC_PATHS")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("warden"))
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        let options = temp_env::with_vars_unset(
            [
                "WARDEN_USERS_FILE",
                "WARDEN_COOKIE_SECURE",
                "WARDEN_TRUSTED_PROXIES",
                "WARDEN_PUBLIC_PATHS",
                "WARDEN_SESSION_TTL_SECONDS",
                "WARDEN_COOKIE_TTL_SECONDS",
                "WARDEN_LOGIN_MAX_ATTEMPTS",
                "WARDEN_LOGIN_BLOCK_SECONDS",
                "WARDEN_LOGIN_MAX_BLOCK_SECONDS",
            ],
            || Options::parse(&command().get_matches_from(["warden"])),
        )?;

        assert!(options.users_file.is_none());
        assert_eq!(options.session_ttl_seconds, 30 * 24 * 60 * 60);
        assert_eq!(options.cookie_ttl_seconds, 365 * 24 * 60 * 60);
        assert!(!options.cookie_secure);
        assert_eq!(options.login.max_attempts, 5);
        assert_eq!(options.login.block_seconds, 900);
        assert_eq!(options.login.max_block_seconds, 86400);
        assert_eq!(options.trusted_proxies, DEFAULT_TRUSTED_PROXIES);
        assert!(options.public_paths.is_empty());
        Ok(())
    }

    #[test]
    fn env_overrides() -> anyhow::Result<()> {
        let options = temp_env::with_vars(
            [
                ("WARDEN_USERS_FILE", Some("/etc/warden/users.json")),
                ("WARDEN_COOKIE_SECURE", Some("true")),
                ("WARDEN_LOGIN_MAX_ATTEMPTS", Some("3")),
                ("WARDEN_TRUSTED_PROXIES", Some("10.0.0.0/8")),
                ("WARDEN_PUBLIC_PATHS", Some("/docs/*,/favicon.ico")),
            ],
            || Options::parse(&command().get_matches_from(["warden"])),
        )?;

        assert_eq!(
            options.users_file,
            Some(PathBuf::from("/etc/warden/users.json"))
        );
        assert!(options.cookie_secure);
        assert_eq!(options.login.max_attempts, 3);
        assert_eq!(options.trusted_proxies, "10.0.0.0/8");
        assert_eq!(options.public_paths, vec!["/docs/*", "/favicon.ico"]);
        Ok(())
    }

    #[test]
    fn repeated_public_path_flags() -> anyhow::Result<()> {
        let options = temp_env::with_vars_unset(["WARDEN_PUBLIC_PATHS"], || {
            Options::parse(&command().get_matches_from([
                "warden",
                "--public-path",
                "/docs/*",
                "--public-path",
                "/static/**",
            ]))
        })?;
        assert_eq!(options.public_paths, vec!["/docs/*", "/static/**"]);
        Ok(())
    }

    #[test]
    fn zero_durations_are_rejected() {
        temp_env::with_vars_unset(
            ["WARDEN_SESSION_TTL_SECONDS", "WARDEN_LOGIN_BLOCK_SECONDS"],
            || {
                let matches = command().get_matches_from(["warden", "--session-ttl-seconds", "0"]);
                assert!(Options::parse(&matches).is_err());

                let matches = command().get_matches_from([
                    "warden",
                    "--login-block-seconds",
                    "600",
                    "--login-max-block-seconds",
                    "60",
                ]);
                assert!(Options::parse(&matches).is_err());

                // Disabled throttling ignores the block settings.
                let matches = command().get_matches_from([
                    "warden",
                    "--login-max-attempts",
                    "0",
                    "--login-block-seconds",
                    "0",
                ]);
                assert!(Options::parse(&matches).is_ok());
            },
        );
    }

    #[test]
    fn oversized_durations_fail_at_parse_time() {
        for arg in [
            "--session-ttl-seconds",
            "--cookie-ttl-seconds",
            "--login-block-seconds",
            "--login-max-block-seconds",
        ] {
            let result = command().try_get_matches_from(["warden", arg, "18446744073709551615"]);
            assert_eq!(
                result.map_err(|e| e.kind()).err(),
                Some(clap::error::ErrorKind::ValueValidation),
                "{arg}"
            );
        }

        let max = MAX_LIFETIME.as_secs().to_string();
        let matches = command().try_get_matches_from(["warden", "--session-ttl-seconds", &max]);
        assert!(matches.is_ok());
    }
}
