use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::config::BoardConfig;
use crate::error::Result;
use crate::thumbnail::EncodedImages;

/// Where a post's full image and thumbnail live, keyed by the post's
/// millisecond timestamp.
pub trait ImageStore: Send + Sync {
    /// Files both artifacts; either both become visible or neither does.
    fn save(&self, key: i64, images: &EncodedImages) -> Result<()>;
    /// Removes both artifacts. Already-missing files are not an error.
    fn delete(&self, key: i64) -> Result<()>;
    fn exists(&self, key: i64) -> bool;
}

pub struct LocalImageStore {
    full_dir: PathBuf,
    thumb_dir: PathBuf,
}

impl LocalImageStore {
    pub fn new(full_dir: impl Into<PathBuf>, thumb_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { full_dir: full_dir.into(), thumb_dir: thumb_dir.into() };
        fs::create_dir_all(&store.full_dir)?;
        fs::create_dir_all(&store.thumb_dir)?;
        Ok(store)
    }

    pub fn from_config(cfg: &BoardConfig) -> Result<Self> {
        Self::new(cfg.full_dir(), cfg.thumb_dir())
    }

    pub fn full_path(&self, key: i64) -> PathBuf {
        self.full_dir.join(format!("{key}.png"))
    }

    pub fn thumb_path(&self, key: i64) -> PathBuf {
        self.thumb_dir.join(format!("{key}.jpg"))
    }
}

impl ImageStore for LocalImageStore {
    fn save(&self, key: i64, images: &EncodedImages) -> Result<()> {
        let full = self.full_path(key);
        let thumb = self.thumb_path(key);
        if full.exists() || thumb.exists() {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("images for key {key} already exist")).into());
        }

        let full_tmp = write_temp(&full, &images.full)?;
        let thumb_tmp = match write_temp(&thumb, &images.thumb) {
            Ok(p) => p,
            Err(e) => {
                discard(&full_tmp);
                return Err(e.into());
            }
        };

        // publish: thumbnail last, withdraw the full image if it cannot follow
        if let Err(e) = fs::rename(&full_tmp, &full) {
            discard(&full_tmp);
            discard(&thumb_tmp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&thumb_tmp, &thumb) {
            error!(key, "failed to publish thumbnail, withdrawing full image: {e}");
            discard(&thumb_tmp);
            discard(&full);
            return Err(e.into());
        }
        debug!(key, full = %full.display(), "stored images");
        Ok(())
    }

    fn delete(&self, key: i64) -> Result<()> {
        let full = remove_if_present(&self.full_path(key));
        let thumb = remove_if_present(&self.thumb_path(key));
        full?;
        thumb?;
        Ok(())
    }

    fn exists(&self, key: i64) -> bool {
        self.full_path(key).exists() && self.thumb_path(key).exists()
    }
}

/// Replaces `path` with `bytes` via a temporary sibling and a rename, so
/// readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = write_temp(path, bytes)?;
    fs::rename(&tmp, path).inspect_err(|_| discard(&tmp))
}

fn write_temp(target: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let name = target.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    let tmp = target.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, bytes).inspect_err(|_| discard(&tmp))?;
    Ok(tmp)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), "failed to clean up file: {e}");
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "image already gone");
            Ok(())
        }
        Err(e) => {
            error!(path = %path.display(), "failed to delete image: {e}");
            Err(e)
        }
    }
}
