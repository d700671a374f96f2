//! Read-only board configuration.
//!
//! Keys follow the camelCase layout of `config.json`; every field has a
//! default so a partial file is accepted. `RIB_*` environment variables can
//! override individual values.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{BoardError, Result};
use crate::identity::MIN_SECRET_LEN;

/// Argon2id cost parameters for anonymized identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityHashParams {
    pub time_cost: u32,
    /// KiB.
    pub memory_cost: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for IdentityHashParams {
    fn default() -> Self {
        Self {
            time_cost: 1,
            memory_cost: 64 * 1024,
            parallelism: 4,
            output_len: 32,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardConfig {
    #[serde(deserialize_with = "secret_opt")]
    pub admin_password: Option<SecretString>,
    #[serde(deserialize_with = "secret_opt")]
    pub identity_secret: Option<SecretString>,
    pub identity_hash: IdentityHashParams,

    /// Seconds.
    pub post_cooldown: u64,
    /// Seconds.
    pub admin_cooldown: u64,

    pub max_posts_per_page: usize,
    pub max_bumps: usize,

    pub max_name_length: usize,
    pub max_subject_length: usize,
    pub max_comment_length: usize,

    /// KiB.
    pub max_upload_size: usize,

    pub thumbnail_dimensions: u32,
    pub thumbnail_quality: u8,

    pub data_dir: PathBuf,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            admin_password: None,
            identity_secret: None,
            identity_hash: IdentityHashParams::default(),
            post_cooldown: 30,
            admin_cooldown: 5,
            max_posts_per_page: 10,
            max_bumps: 300,
            max_name_length: 32,
            max_subject_length: 64,
            max_comment_length: 2000,
            max_upload_size: 4096,
            thumbnail_dimensions: 200,
            thumbnail_quality: 80,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl BoardConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let cfg: Self = serde_json::from_slice(&bytes).map_err(|e| {
            BoardError::invalid(format!("config file {}: {e}", path.as_ref().display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults with `RIB_*` overrides applied.
    pub fn from_env() -> Result<Self> {
        let cfg = Self::default().with_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_env_overrides(mut self) -> Self {
        fn num_env<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse().ok())
        }
        fn secret_env(name: &str) -> Option<SecretString> {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .map(SecretString::from)
        }

        if let Some(v) = secret_env("RIB_ADMIN_PASSWORD") {
            self.admin_password = Some(v);
        }
        if let Some(v) = secret_env("RIB_IDENTITY_SECRET") {
            self.identity_secret = Some(v);
        }
        if let Some(v) = num_env("RIB_POST_COOLDOWN") {
            self.post_cooldown = v;
        }
        if let Some(v) = num_env("RIB_ADMIN_COOLDOWN") {
            self.admin_cooldown = v;
        }
        if let Some(v) = num_env("RIB_MAX_POSTS_PER_PAGE") {
            self.max_posts_per_page = v;
        }
        if let Some(v) = num_env("RIB_MAX_BUMPS") {
            self.max_bumps = v;
        }
        if let Some(v) = num_env("RIB_MAX_UPLOAD_SIZE") {
            self.max_upload_size = v;
        }
        if let Some(v) = num_env("RIB_THUMBNAIL_DIMENSIONS") {
            self.thumbnail_dimensions = v;
        }
        if let Some(v) = num_env("RIB_THUMBNAIL_QUALITY") {
            self.thumbnail_quality = v;
        }
        if let Ok(v) = std::env::var("RIB_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_posts_per_page == 0 {
            return Err(BoardError::invalid("config: maxPostsPerPage must be positive"));
        }
        if self.thumbnail_dimensions == 0 {
            return Err(BoardError::invalid("config: thumbnailDimensions must be positive"));
        }
        if !(1..=100).contains(&self.thumbnail_quality) {
            return Err(BoardError::invalid("config: thumbnailQuality must be within 1..=100"));
        }
        if let Some(secret) = &self.identity_secret {
            if secret.expose_secret().len() < MIN_SECRET_LEN {
                return Err(BoardError::invalid(format!(
                    "config: identitySecret must be at least {MIN_SECRET_LEN} bytes"
                )));
            }
        }
        Ok(())
    }

    pub fn post_cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.post_cooldown as i64)
    }

    pub fn admin_cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.admin_cooldown as i64)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size.saturating_mul(1024)
    }

    pub fn posts_file(&self) -> PathBuf {
        self.data_dir.join("posts.json")
    }

    pub fn posters_file(&self) -> PathBuf {
        self.data_dir.join("posters.json")
    }

    pub fn full_dir(&self) -> PathBuf {
        self.data_dir.join("full")
    }

    pub fn thumb_dir(&self) -> PathBuf {
        self.data_dir.join("thumb")
    }
}

// Empty strings mean "not configured".
fn secret_opt<'de, D>(d: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: BoardConfig = serde_json::from_str(
            r#"{"postCooldown": 60, "maxBumps": 2, "adminPassword": "", "identityHash": {"memoryCost": 16}}"#,
        )
        .unwrap();
        assert_eq!(cfg.post_cooldown, 60);
        assert_eq!(cfg.max_bumps, 2);
        assert_eq!(cfg.max_posts_per_page, 10);
        assert!(cfg.admin_password.is_none());
        assert_eq!(cfg.identity_hash.memory_cost, 16);
        assert_eq!(cfg.identity_hash.time_cost, 1);
        assert_eq!(cfg.post_cooldown(), TimeDelta::seconds(60));
    }

    #[test]
    fn short_identity_secret_is_rejected() {
        let cfg = BoardConfig {
            identity_secret: Some(SecretString::from("short".to_string())),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = BoardConfig {
            thumbnail_quality: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(BoardConfig::default().validate().is_ok());
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        std::env::set_var("RIB_MAX_BUMPS", "7");
        std::env::set_var("RIB_THUMBNAIL_QUALITY", "not-a-number");
        let cfg = BoardConfig::from_env().unwrap();
        std::env::remove_var("RIB_MAX_BUMPS");
        std::env::remove_var("RIB_THUMBNAIL_QUALITY");
        assert_eq!(cfg.max_bumps, 7);
        assert_eq!(cfg.thumbnail_quality, 80);
    }
}
