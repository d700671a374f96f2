//! Admin actions: password-gated deletion and bans.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::models::Id;
use crate::rate_limit::PosterLedger;
use crate::repo::PostRepo;

/// Checks `given` against the configured admin password, which is either
/// plaintext or an Argon2 PHC string.
pub fn password_matches(expected: &str, given: &str) -> bool {
    if expected.starts_with("$argon2") {
        return match PasswordHash::new(expected) {
            Ok(hash) => Argon2::default().verify_password(given.as_bytes(), &hash).is_ok(),
            Err(e) => {
                warn!("admin password hash is malformed: {e}");
                false
            }
        };
    }
    expected.len() == given.len() && expected.bytes().zip(given.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[derive(Clone)]
pub struct Moderator {
    config: Arc<BoardConfig>,
    posts: Arc<dyn PostRepo>,
    ledger: PosterLedger,
}

impl Moderator {
    pub fn new(config: Arc<BoardConfig>, posts: Arc<dyn PostRepo>, ledger: PosterLedger) -> Self {
        Self { config, posts, ledger }
    }

    /// Shared by every admin action. The attempt is stamped against the
    /// admin cooldown before the password is looked at.
    fn authorize(&self, identity: &str, password: &str, now: DateTime<Utc>) -> Result<()> {
        let Some(expected) = &self.config.admin_password else {
            return Err(BoardError::AdminDisabled);
        };
        self.ledger.admit_admin(identity, now)?;
        if !password_matches(expected.expose_secret(), password) {
            warn!(identity, "admin password rejected");
            return Err(BoardError::Unauthorized);
        }
        Ok(())
    }

    pub fn login(&self, identity: &str, password: &str, now: DateTime<Utc>) -> Result<()> {
        self.authorize(identity, password, now)?;
        info!(identity, "admin login");
        Ok(())
    }

    pub fn delete(&self, identity: &str, password: &str, id: Id, now: DateTime<Utc>) -> Result<()> {
        self.authorize(identity, password, now)?;
        self.posts.delete(id)?;
        info!(identity, post_id = id, "admin deleted post");
        Ok(())
    }

    /// Bans the author of `id` and purges everything they posted. Returns the
    /// number of authored posts removed.
    pub fn ban(&self, identity: &str, password: &str, id: Id, now: DateTime<Utc>) -> Result<usize> {
        self.authorize(identity, password, now)?;
        let author = self.posts.get(id)?.poster;
        self.ban_and_purge(&author)
    }

    /// Flags `identity` as banned, creating its record if needed, then
    /// removes its threads and replies.
    pub fn ban_and_purge(&self, identity: &str) -> Result<usize> {
        self.ledger.ban(identity)?;
        self.posts.delete_by_poster(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    #[test]
    fn plaintext_password() {
        assert!(password_matches("hunter2", "hunter2"));
        assert!(!password_matches("hunter2", "hunter3"));
        assert!(!password_matches("hunter2", "hunter"));
        assert!(!password_matches("hunter2", ""));
    }

    #[test]
    fn phc_password() {
        let salt = SaltString::from_b64("c29tZXNhbHRzb21lc2FsdA").unwrap();
        let phc = Argon2::default().hash_password(b"hunter2", &salt).unwrap().to_string();
        assert!(password_matches(&phc, "hunter2"));
        assert!(!password_matches(&phc, "hunter3"));
        // the PHC string itself is not accepted as a password
        assert!(!password_matches(&phc, &phc));
        assert!(!password_matches("$argon2id$garbage", "x"));
    }
}
