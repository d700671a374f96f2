//! Submission workflow and the public read views.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::identity::IdentityDeriver;
use crate::models::*;
use crate::moderation::Moderator;
use crate::rate_limit::{Cooldowns, PosterLedger};
use crate::repo::json::{JsonPostStore, JsonPosterStore};
use crate::repo::{PostRepo, PosterRepo};
use crate::storage::{ImageStore, LocalImageStore};
use crate::thumbnail::Thumbnailer;

/// Slices the bump-ordered thread list into 1-based pages. An empty board
/// still has one (empty) page.
pub fn paginate(threads: Vec<Post>, page: usize, per_page: usize) -> Result<Page> {
    let per_page = per_page.max(1);
    let pages = threads.len().div_ceil(per_page).max(1);
    if page == 0 || page > pages {
        return Err(BoardError::PageOutOfRange(page));
    }
    let threads = threads.into_iter().skip((page - 1) * per_page).take(per_page).collect();
    Ok(Page { threads, page, pages })
}

/// Trims `raw` and enforces a limit counted in characters, not bytes.
fn clean_field(raw: &str, max: usize, what: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.chars().count() > max {
        return Err(BoardError::invalid(format!("{what}: longer than {max} characters")));
    }
    Ok(trimmed.to_string())
}

pub struct Imageboard {
    config: Arc<BoardConfig>,
    posts: Arc<dyn PostRepo>,
    ledger: PosterLedger,
    images: Arc<dyn ImageStore>,
    thumbnailer: Thumbnailer,
    identities: IdentityDeriver,
    moderator: Moderator,
}

impl Imageboard {
    pub fn new(
        config: BoardConfig,
        posts: Arc<dyn PostRepo>,
        posters: Arc<dyn PosterRepo>,
        images: Arc<dyn ImageStore>,
    ) -> Result<Self> {
        config.validate()?;
        let identities = IdentityDeriver::from_config(&config)?;
        let thumbnailer = Thumbnailer::from_config(&config);
        let ledger = PosterLedger::new(posters, Cooldowns::from_config(&config));
        let config = Arc::new(config);
        let moderator = Moderator::new(config.clone(), posts.clone(), ledger.clone());
        Ok(Self {
            config,
            posts,
            ledger,
            images,
            thumbnailer,
            identities,
            moderator,
        })
    }

    /// File-backed board rooted at `config.data_dir`.
    pub fn open(config: BoardConfig) -> Result<Self> {
        let images: Arc<dyn ImageStore> = Arc::new(LocalImageStore::from_config(&config)?);
        let posts = Arc::new(JsonPostStore::open(
            config.posts_file(),
            images.clone(),
            config.max_bumps,
        )?);
        let posters = Arc::new(JsonPosterStore::open(config.posters_file())?);
        info!(data_dir = %config.data_dir.display(), "opened board");
        Self::new(config, posts, posters, images)
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn posts(&self) -> &Arc<dyn PostRepo> {
        &self.posts
    }

    pub fn ledger(&self) -> &PosterLedger {
        &self.ledger
    }

    pub fn images(&self) -> &Arc<dyn ImageStore> {
        &self.images
    }

    pub fn identities(&self) -> &IdentityDeriver {
        &self.identities
    }

    pub fn moderator(&self) -> &Moderator {
        &self.moderator
    }

    /// Validates, rate-limits and files a new thread or reply on behalf of
    /// `identity`. Nothing is written unless every check passes. Once the
    /// cooldown is stamped, any later failure withdraws the published
    /// images and releases the stamp again.
    pub fn submit(&self, identity: &str, new: NewPost, now: DateTime<Utc>) -> Result<Submitted> {
        let cfg = &*self.config;
        let name = clean_field(&new.name, cfg.max_name_length, "name")?;
        let subject = clean_field(&new.subject, cfg.max_subject_length, "subject")?;
        let body = clean_field(&new.body, cfg.max_comment_length, "comment")?;
        if new.parent < 0 {
            return Err(BoardError::invalid("parent: must not be negative"));
        }
        if body.is_empty() && new.image.is_none() {
            return Err(BoardError::invalid("a comment or an image is required"));
        }
        if let Some(bytes) = &new.image {
            if bytes.len() > cfg.max_upload_bytes() {
                return Err(BoardError::invalid(format!(
                    "image: larger than {} KiB",
                    cfg.max_upload_size
                )));
            }
        }
        if new.parent != 0 {
            match self.posts.get(new.parent) {
                Ok(p) if p.is_thread() => {}
                Ok(_) | Err(BoardError::UnknownPost(_)) => {
                    return Err(BoardError::ParentNotFound(new.parent))
                }
                Err(e) => return Err(e),
            }
        }
        // decoding writes nothing, so a bad upload is rejected before the gate
        let encoded = match &new.image {
            Some(bytes) => Some(self.thumbnailer.process(bytes)?),
            None => None,
        };

        let posted = truncate_millis(now);
        let previous = self.ledger.admit_post(identity, posted)?;

        let key = posted.timestamp_millis();
        if let Some(encoded) = &encoded {
            if let Err(e) = self.images.save(key, encoded) {
                self.release(identity, posted, previous);
                return Err(e);
            }
            debug!(key, width = encoded.width, height = encoded.height, "published upload");
        }

        let image = encoded.is_some();
        let post = Post {
            id: 0,
            parent: new.parent,
            name,
            subject,
            body,
            image,
            poster: identity.to_string(),
            posted,
            replies: Vec::new(),
        };
        let id = match self.posts.add(post) {
            Ok(id) => id,
            Err(e) => {
                // also covers a thread deleted since the parent check
                self.withdraw(key, image);
                self.release(identity, posted, previous);
                return Err(e);
            }
        };
        let thread = if new.parent == 0 { id } else { new.parent };
        info!(post_id = id, thread, image, "accepted submission");
        Ok(Submitted { id, thread })
    }

    fn withdraw(&self, key: i64, image: bool) {
        if !image {
            return;
        }
        if let Err(e) = self.images.delete(key) {
            error!(key, "failed to withdraw images of rejected post: {e}");
        }
    }

    fn release(&self, identity: &str, admitted: DateTime<Utc>, previous: Option<DateTime<Utc>>) {
        if let Err(e) = self.ledger.release_post(identity, admitted, previous) {
            error!(identity, "failed to release cooldown of rejected post: {e}");
        }
    }

    pub fn page(&self, page: usize) -> Result<Page> {
        paginate(self.posts.get_all()?, page, self.config.max_posts_per_page)
    }

    /// A thread with its replies, or a pointer into the thread when `id`
    /// names a reply.
    pub fn thread(&self, id: Id) -> Result<ThreadLookup> {
        let post = self.posts.get(id)?;
        if post.is_thread() {
            Ok(ThreadLookup::Thread(post))
        } else {
            Ok(ThreadLookup::Reply { thread: post.parent, reply: post.id })
        }
    }
}
