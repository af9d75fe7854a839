//! Administrative user directory.
//!
//! The directory is the source of truth for who may log in. Sessions only
//! store the login name; every authenticated request re-resolves it here so
//! removing a user revokes access immediately.
//!
//! `StaticDirectory` keeps users in memory and verifies argon2 PHC hashes. It
//! can be loaded from a JSON file:
//!
//! ```json
//! { "users": [ { "name": "admin", "password_hash": "$argon2id$v=19$..." } ] }
//! ```

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("user directory task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A user known to the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub login: String,
}

pub trait UserDirectory: Send + Sync {
    /// Number of configured users; zero means bootstrap mode.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn count(&self) -> Result<usize, DirectoryError>;

    /// Look up a user by login name.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn by_login(&self, login: &str) -> Result<Option<User>, DirectoryError>;

    /// Verify a login and password. Unknown logins and wrong passwords both
    /// yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be read.
    fn authenticate(
        &self,
        login: &str,
        password: &SecretString,
    ) -> Result<Option<User>, DirectoryError>;
}

#[derive(Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Clone, Deserialize)]
struct UserRecord {
    name: String,
    password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("name", &self.name)
            .field("password_hash", &"***")
            .finish()
    }
}

pub struct StaticDirectory {
    users: RwLock<Vec<UserRecord>>,
    // Verified against for unknown logins so both failure paths cost the same.
    dummy_hash: String,
}

impl std::fmt::Debug for StaticDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticDirectory")
            .field("users", &*self.read())
            .finish_non_exhaustive()
    }
}

impl StaticDirectory {
    /// Create an empty directory.
    ///
    /// # Errors
    /// Returns an error if the timing-equalisation hash cannot be computed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            users: RwLock::new(Vec::new()),
            dummy_hash: hash_password("warden-dummy-password")?,
        })
    }

    /// Load users from a JSON file. Every hash is validated up front.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid hash or duplicate login.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file: {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid users file: {}", path.display()))
    }

    /// # Errors
    /// Same as [`StaticDirectory::from_file`].
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: UsersFile = serde_json::from_str(raw).context("malformed JSON")?;
        let directory = Self::new()?;
        for record in file.users {
            directory.insert(record)?;
        }
        Ok(directory)
    }

    /// Add a user with an already hashed password.
    ///
    /// # Errors
    /// Returns an error for an invalid hash, an empty login or a duplicate.
    pub fn add_user(&self, login: &str, password_hash: &str) -> Result<()> {
        self.insert(UserRecord {
            name: login.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    /// Remove a user; returns whether it existed.
    pub fn remove_user(&self, login: &str) -> bool {
        let mut users = self.write();
        let before = users.len();
        users.retain(|user| user.name != login);
        before != users.len()
    }

    fn insert(&self, record: UserRecord) -> Result<()> {
        if record.name.trim().is_empty() {
            anyhow::bail!("user name must not be empty");
        }
        PasswordHash::new(&record.password_hash)
            .map_err(|err| anyhow::anyhow!("invalid password hash for {:?}: {err}", record.name))?;

        let mut users = self.write();
        if users.iter().any(|user| user.name == record.name) {
            anyhow::bail!("duplicate user name: {:?}", record.name);
        }
        users.push(record);
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<UserRecord>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<UserRecord>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserDirectory for StaticDirectory {
    fn count(&self) -> Result<usize, DirectoryError> {
        Ok(self.read().len())
    }

    fn by_login(&self, login: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self
            .read()
            .iter()
            .find(|user| user.name == login)
            .map(|user| User {
                login: user.name.clone(),
            }))
    }

    fn authenticate(
        &self,
        login: &str,
        password: &SecretString,
    ) -> Result<Option<User>, DirectoryError> {
        // Copy the hash out so the slow verification runs without the lock.
        let record = self.read().iter().find(|user| user.name == login).cloned();
        let stored = record
            .as_ref()
            .map_or(self.dummy_hash.as_str(), |record| record.password_hash.as_str());

        let parsed = PasswordHash::new(stored)
            .map_err(|err| DirectoryError::Unavailable(format!("stored hash unreadable: {err}")))?;
        let verified = Argon2::default()
            .verify_password(password.expose_secret().as_bytes(), &parsed)
            .is_ok();

        Ok(record.filter(|_| verified).map(|record| User {
            login: record.name,
        }))
    }
}

/// Produce an argon2id PHC string for `password`.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn directory() -> Result<StaticDirectory> {
        let directory = StaticDirectory::new()?;
        directory.add_user("admin", &hash_password("correct horse")?)?;
        Ok(directory)
    }

    #[test]
    fn authenticate_accepts_valid_credentials() -> Result<()> {
        let directory = directory()?;
        let user = directory.authenticate("admin", &secret("correct horse"))?;
        assert_eq!(user.map(|u| u.login).as_deref(), Some("admin"));
        Ok(())
    }

    #[test]
    fn authenticate_rejects_wrong_password_and_unknown_user() -> Result<()> {
        let directory = directory()?;
        assert!(directory.authenticate("admin", &secret("wrong"))?.is_none());
        assert!(directory
            .authenticate("nobody", &secret("correct horse"))?
            .is_none());
        // The dummy hash never authenticates anyone.
        assert!(directory
            .authenticate("nobody", &secret("warden-dummy-password"))?
            .is_none());
        Ok(())
    }

    #[test]
    fn count_and_removal() -> Result<()> {
        let directory = directory()?;
        assert_eq!(directory.count()?, 1);
        assert!(directory.by_login("admin")?.is_some());
        assert!(directory.remove_user("admin"));
        assert!(!directory.remove_user("admin"));
        assert_eq!(directory.count()?, 0);
        assert!(directory.by_login("admin")?.is_none());
        Ok(())
    }

    #[test]
    fn from_json_validates_records() -> Result<()> {
        let hash = hash_password("pw")?;
        let raw = format!(r#"{{"users":[{{"name":"admin","password_hash":"{hash}"}}]}}"#);
        assert_eq!(StaticDirectory::from_json(&raw)?.count()?, 1);

        assert_eq!(StaticDirectory::from_json("{}")?.count()?, 0);
        assert!(StaticDirectory::from_json("not json").is_err());
        assert!(StaticDirectory::from_json(
            r#"{"users":[{"name":"admin","password_hash":"plain"}]}"#
        )
        .is_err());

        let duplicate = format!(
            r#"{{"users":[{{"name":"a","password_hash":"{hash}"}},{{"name":"a","password_hash":"{hash}"}}]}}"#
        );
        assert!(StaticDirectory::from_json(&duplicate).is_err());
        Ok(())
    }

    #[test]
    fn debug_hides_password_hashes() -> Result<()> {
        let directory = directory()?;
        assert!(!format!("{directory:?}").contains("argon2"));
        Ok(())
    }
}
