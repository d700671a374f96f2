use crate::error::Result;
use crate::models::*;

/// Thread/reply persistence.
pub trait PostRepo: Send + Sync {
    /// Every thread, most recently bumped first.
    fn get_all(&self) -> Result<Vec<Post>>;
    fn get(&self, id: Id) -> Result<Post>;
    /// Allocates the id and files the post as a thread (`parent == 0`) or as
    /// a reply to an existing thread.
    fn add(&self, post: Post) -> Result<Id>;
    /// Removes a reply, or a whole thread with its replies, and their images.
    fn delete(&self, id: Id) -> Result<()>;
    /// Removes everything authored by `poster`. Returns how many authored
    /// posts were removed.
    fn delete_by_poster(&self, poster: &str) -> Result<usize>;
}

/// Identity → poster record.
pub trait PosterRepo: Send + Sync {
    fn get(&self, identity: &str) -> Result<Poster>;
    /// Replaces the stored record wholesale.
    fn add(&self, identity: &str, poster: Poster) -> Result<()>;
    /// Atomic read-modify-write of one record, starting from the default
    /// record when none exists. Returns the stored result.
    fn update(&self, identity: &str, f: &mut dyn FnMut(&mut Poster)) -> Result<Poster>;
}

/// Timestamp a thread ranks by: its `min(max_bumps, replies)`-th reply, or
/// its own post time when it has none. A cap of 0 disables bumping.
pub fn bump_time(thread: &Post, max_bumps: usize) -> chrono::DateTime<chrono::Utc> {
    let capped = max_bumps.min(thread.replies.len());
    match capped.checked_sub(1).and_then(|i| thread.replies.get(i)) {
        Some(reply) => reply.posted,
        None => thread.posted,
    }
}

/// Stable sort, latest bump first.
pub fn sort_by_bump(threads: &mut [Post], max_bumps: usize) {
    threads.sort_by(|a, b| bump_time(b, max_bumps).cmp(&bump_time(a, max_bumps)));
}

/// JSON flat-file stores. Each keeps the decoded file in memory behind an
/// `RwLock`; a mutation works on a copy, rewrites the whole file, and only
/// then swaps the copy in.
pub mod json {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, PoisonError, RwLock};

    use serde::de::DeserializeOwned;
    use tracing::{error, info, warn};

    use super::*;
    use crate::error::BoardError;
    use crate::storage::{write_atomic, ImageStore};

    fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
        match std::fs::read(path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => {
                // an empty store may have been written as `null`
                let v: Option<T> = serde_json::from_slice(&bytes).inspect_err(|e| {
                    error!(path = %path.display(), "failed to decode store: {e}");
                })?;
                info!(path = %path.display(), "loaded store");
                Ok(v.unwrap_or_default())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no store file yet, starting empty");
                Ok(T::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn persist<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        write_atomic(path, &bytes).inspect_err(|e| {
            error!(path = %path.display(), "failed to write store: {e}");
        })?;
        Ok(())
    }

    pub struct JsonPostStore {
        threads: RwLock<Vec<Post>>,
        path: PathBuf,
        images: Arc<dyn ImageStore>,
        max_bumps: usize,
    }

    impl JsonPostStore {
        pub fn open(path: impl Into<PathBuf>, images: Arc<dyn ImageStore>, max_bumps: usize) -> Result<Self> {
            let path = path.into();
            let threads = load(&path)?;
            Ok(Self { threads: RwLock::new(threads), path, images, max_bumps })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Runs `f` on a copy of the threads; commits the copy if `f`
        /// succeeds and the file write goes through.
        fn transaction<R>(&self, f: impl FnOnce(&mut Vec<Post>) -> Result<R>) -> Result<R> {
            let mut guard = self.threads.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = guard.clone();
            let out = f(&mut next)?;
            persist(&self.path, &next)?;
            *guard = next;
            Ok(out)
        }

        fn remove_images(&self, keys: &[i64]) -> Result<()> {
            let mut first_err = None;
            for key in keys {
                if let Err(e) = self.images.delete(*key) {
                    first_err.get_or_insert(e);
                }
            }
            first_err.map_or(Ok(()), Err)
        }
    }

    fn next_id(threads: &[Post]) -> Id {
        threads
            .iter()
            .flat_map(|t| std::iter::once(t.id).chain(t.replies.iter().map(|r| r.id)))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Removes `id` from `threads`, returning the image keys it owned (replies
    /// first, then the thread's own).
    fn remove_post(threads: &mut Vec<Post>, id: Id) -> Option<Vec<i64>> {
        if let Some(ti) = threads.iter().position(|t| t.id == id) {
            let thread = threads.remove(ti);
            let mut keys: Vec<i64> = thread.replies.iter().filter(|r| r.image).map(Post::image_key).collect();
            if thread.image {
                keys.push(thread.image_key());
            }
            return Some(keys);
        }
        for thread in threads.iter_mut() {
            if let Some(ri) = thread.replies.iter().position(|r| r.id == id) {
                let reply = thread.replies.remove(ri);
                return Some(if reply.image { vec![reply.image_key()] } else { vec![] });
            }
        }
        None
    }

    impl PostRepo for JsonPostStore {
        fn get_all(&self) -> Result<Vec<Post>> {
            let mut threads = self.threads.read().unwrap_or_else(PoisonError::into_inner).clone();
            sort_by_bump(&mut threads, self.max_bumps);
            Ok(threads)
        }

        fn get(&self, id: Id) -> Result<Post> {
            let threads = self.threads.read().unwrap_or_else(PoisonError::into_inner);
            threads
                .iter()
                .find(|t| t.id == id)
                .or_else(|| threads.iter().flat_map(|t| t.replies.iter()).find(|r| r.id == id))
                .cloned()
                .ok_or(BoardError::UnknownPost(id))
        }

        fn add(&self, mut post: Post) -> Result<Id> {
            let id = self.transaction(|threads| {
                post.id = next_id(threads);
                post.replies.clear();
                let id = post.id;
                if post.parent == 0 {
                    threads.push(post);
                } else {
                    let parent = post.parent;
                    let thread = threads
                        .iter_mut()
                        .find(|t| t.id == parent)
                        .ok_or(BoardError::ParentNotFound(parent))?;
                    thread.replies.push(post);
                }
                Ok(id)
            })?;
            info!(post_id = id, "added post");
            Ok(id)
        }

        fn delete(&self, id: Id) -> Result<()> {
            let keys = self.transaction(|threads| remove_post(threads, id).ok_or(BoardError::UnknownPost(id)))?;
            info!(post_id = id, images = keys.len(), "deleted post");
            self.remove_images(&keys)
        }

        fn delete_by_poster(&self, poster: &str) -> Result<usize> {
            let (removed, keys) = self.transaction(|threads| {
                let mut authored = Vec::new();
                for t in threads.iter() {
                    if t.poster == poster {
                        // takes its replies with it
                        authored.push(t.id);
                        continue;
                    }
                    authored.extend(t.replies.iter().filter(|r| r.poster == poster).map(|r| r.id));
                }
                let mut keys = Vec::new();
                for id in &authored {
                    keys.extend(remove_post(threads, *id).unwrap_or_default());
                }
                Ok((authored.len(), keys))
            })?;
            if removed > 0 {
                warn!(identity = %poster, removed, "purged poster content");
            }
            self.remove_images(&keys)?;
            Ok(removed)
        }
    }

    pub struct JsonPosterStore {
        posters: RwLock<HashMap<String, Poster>>,
        path: PathBuf,
    }

    impl JsonPosterStore {
        pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
            let path = path.into();
            let posters = load(&path)?;
            Ok(Self { posters: RwLock::new(posters), path })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl PosterRepo for JsonPosterStore {
        fn get(&self, identity: &str) -> Result<Poster> {
            self.posters
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(identity)
                .cloned()
                .ok_or(BoardError::UnknownPoster)
        }

        fn add(&self, identity: &str, poster: Poster) -> Result<()> {
            self.update(identity, &mut |p: &mut Poster| *p = poster.clone()).map(|_| ())
        }

        fn update(&self, identity: &str, f: &mut dyn FnMut(&mut Poster)) -> Result<Poster> {
            let mut guard = self.posters.write().unwrap_or_else(PoisonError::into_inner);
            let mut record = guard.get(identity).cloned().unwrap_or_default();
            f(&mut record);
            let mut next = guard.clone();
            next.insert(identity.to_string(), record.clone());
            persist(&self.path, &next)?;
            *guard = next;
            Ok(record)
        }
    }
}
