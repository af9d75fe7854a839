//! Paths that are served without authentication.
//!
//! Patterns are compiled once at startup; an invalid pattern aborts the
//! process before any request is accepted.

use anyhow::{Context, Result};
use regex::Regex;

pub const LOGIN_PAGE: &str = "/login.html";
pub const LANDING_PAGE: &str = "/";

/// Built-in public patterns, see [`PathPattern::parse`] for the syntax.
pub const DEFAULT_PUBLIC_PATHS: [&str; 5] = [
    "/assets/*",
    "/login.*",
    "/health",
    "/control/login",
    "/control/logout",
];

#[derive(Clone, Debug)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
    Glob(Regex),
}

impl PathPattern {
    /// Parse a pattern:
    /// - `/a/b` matches exactly,
    /// - `/a/**` matches `/a/` and everything below it,
    /// - `*` anywhere else matches any run of characters except `/`.
    ///
    /// # Errors
    /// Returns an error for empty or relative patterns.
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if !pattern.starts_with('/') {
            anyhow::bail!("public path pattern must start with '/': {pattern:?}");
        }

        if let Some(prefix) = pattern.strip_suffix("**") {
            if !prefix.contains('*') {
                return Ok(Self::Prefix(prefix.to_string()));
            }
        }

        if !pattern.contains('*') {
            return Ok(Self::Exact(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^/]*");
        let regex = Regex::new(&format!("^{body}$"))
            .with_context(|| format!("invalid public path pattern: {pattern:?}"))?;
        Ok(Self::Glob(regex))
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Glob(regex) => regex.is_match(path),
        }
    }
}

/// Ordered allow-list; the first matching pattern wins.
#[derive(Clone, Debug)]
pub struct PublicResources {
    patterns: Vec<PathPattern>,
}

impl PublicResources {
    /// Compile the default patterns plus `extra`.
    ///
    /// # Errors
    /// Returns an error if any pattern is invalid.
    pub fn new<I, S>(extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let defaults = DEFAULT_PUBLIC_PATHS.iter().map(|p| PathPattern::parse(p));
        let extra = extra.into_iter().map(|p| PathPattern::parse(p.as_ref()));
        let patterns = defaults.chain(extra).collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_assets_and_login() -> Result<()> {
        let public = PublicResources::new(Vec::<String>::new())?;
        assert_eq!(public.len(), DEFAULT_PUBLIC_PATHS.len());
        assert!(public.is_public("/assets/app.js"));
        assert!(public.is_public("/login.html"));
        assert!(public.is_public("/login.css"));
        assert!(public.is_public("/control/login"));
        assert!(public.is_public("/health"));

        assert!(!public.is_public("/"));
        assert!(!public.is_public("/index.html"));
        assert!(!public.is_public("/assets/js/app.js"));
        assert!(!public.is_public("/control/profile"));
        assert!(!public.is_public("/login"));
        Ok(())
    }

    #[test]
    fn glob_metacharacters_are_literal() -> Result<()> {
        let pattern = PathPattern::parse("/login.*")?;
        assert!(pattern.matches("/login.html"));
        assert!(!pattern.matches("/loginXhtml"));
        Ok(())
    }

    #[test]
    fn prefix_patterns_match_subtrees() -> Result<()> {
        let public = PublicResources::new(["/static/**"])?;
        assert!(public.is_public("/static/"));
        assert!(public.is_public("/static/js/app.js"));
        assert!(!public.is_public("/staticfile"));
        Ok(())
    }

    #[test]
    fn invalid_patterns_fail_at_startup() {
        assert!(PublicResources::new(["relative/path"]).is_err());
        assert!(PublicResources::new([""]).is_err());
    }
}
