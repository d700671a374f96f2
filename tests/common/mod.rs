#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use rib_bbs::repo::json::{JsonPostStore, JsonPosterStore};
use rib_bbs::storage::ImageStore;
use rib_bbs::thumbnail::EncodedImages;
use rib_bbs::{BoardConfig, Imageboard};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

// ---------------- In-memory Mock ImageStore (tests only) ----------------
#[derive(Default)]
pub struct MockImageStore {
    pub inner: Mutex<HashMap<i64, EncodedImages>>,
}

impl MockImageStore {
    pub fn keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.inner.lock().unwrap().keys().copied().collect();
        keys.sort();
        keys
    }
}

impl ImageStore for MockImageStore {
    fn save(&self, key: i64, images: &EncodedImages) -> rib_bbs::Result<()> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&key) {
            return Err(std::io::Error::new(std::io::ErrorKind::AlreadyExists, "duplicate key").into());
        }
        map.insert(key, images.clone());
        Ok(())
    }

    fn delete(&self, key: i64) -> rib_bbs::Result<()> {
        self.inner.lock().unwrap().remove(&key);
        Ok(())
    }

    fn exists(&self, key: i64) -> bool {
        self.inner.lock().unwrap().contains_key(&key)
    }
}

/// Half-transparent red PNG of the given size.
pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 128]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// A board backed by JSON files in a fresh temp dir and a mock image store.
pub struct Fixture {
    pub dir: TempDir,
    pub images: Arc<MockImageStore>,
    pub board: Imageboard,
}

pub fn fixture(config: BoardConfig) -> Fixture {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = BoardConfig { data_dir: dir.path().to_path_buf(), ..config };
    let images = Arc::new(MockImageStore::default());
    let posts = Arc::new(JsonPostStore::open(config.posts_file(), images.clone(), config.max_bumps).unwrap());
    let posters = Arc::new(JsonPosterStore::open(config.posters_file()).unwrap());
    let board = Imageboard::new(config, posts, posters, images.clone()).unwrap();
    Fixture { dir, images, board }
}
