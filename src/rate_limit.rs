use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::config::BoardConfig;
use crate::error::{BoardError, Result};
use crate::models::Poster;
use crate::repo::PosterRepo;

/// Minimum spacing between two actions of the same kind by one identity.
#[derive(Clone, Copy, Debug)]
pub struct Cooldowns {
    pub post: TimeDelta,
    pub admin: TimeDelta,
}

impl Cooldowns {
    pub fn from_config(cfg: &BoardConfig) -> Self {
        Self {
            post: cfg.post_cooldown(),
            admin: cfg.admin_cooldown(),
        }
    }
}

/// Rejects banned posters and actions still inside their cooldown window.
pub fn gate(
    poster: &Poster,
    last: Option<DateTime<Utc>>,
    cooldown: TimeDelta,
    now: DateTime<Utc>,
) -> Result<()> {
    if poster.banned {
        return Err(BoardError::Banned);
    }
    if let Some(last) = last {
        let ready_at = last + cooldown;
        if ready_at > now {
            return Err(BoardError::RateLimited { retry_after: ready_at - now });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Action {
    Post,
    Admin,
}

/// Cooldown and ban bookkeeping on top of a [`PosterRepo`].
#[derive(Clone)]
pub struct PosterLedger {
    repo: Arc<dyn PosterRepo>,
    cooldowns: Cooldowns,
}

impl PosterLedger {
    pub fn new(repo: Arc<dyn PosterRepo>, cooldowns: Cooldowns) -> Self {
        Self { repo, cooldowns }
    }

    pub fn repo(&self) -> &Arc<dyn PosterRepo> {
        &self.repo
    }

    /// Stored record, or a fresh one for identities never seen before.
    pub fn lookup(&self, identity: &str) -> Result<Poster> {
        match self.repo.get(identity) {
            Err(BoardError::UnknownPoster) => Ok(Poster::default()),
            other => other,
        }
    }

    /// Gates a submission and stamps `last_post` in one step, so concurrent
    /// submissions from one identity cannot all pass the cooldown. Returns
    /// the stamp it replaced, for [`release_post`](Self::release_post).
    pub fn admit_post(&self, identity: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let (previous, _) = self.admit(identity, now, Action::Post)?;
        Ok(previous)
    }

    /// Undoes the stamp of a submission that was admitted but then failed.
    /// A stamp written by a later submission is left alone.
    pub fn release_post(
        &self,
        identity: &str,
        admitted: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.repo.update(identity, &mut |p: &mut Poster| {
            if p.last_post == Some(admitted) {
                p.last_post = previous;
            }
        })?;
        debug!(identity, "released post cooldown");
        Ok(())
    }

    pub fn admit_admin(&self, identity: &str, now: DateTime<Utc>) -> Result<Poster> {
        let (_, poster) = self.admit(identity, now, Action::Admin)?;
        Ok(poster)
    }

    fn admit(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        action: Action,
    ) -> Result<(Option<DateTime<Utc>>, Poster)> {
        let cooldown = match action {
            Action::Post => self.cooldowns.post,
            Action::Admin => self.cooldowns.admin,
        };
        let mut previous = None;
        let mut refused = None;
        let poster = self.repo.update(identity, &mut |p: &mut Poster| {
            let last = match action {
                Action::Post => p.last_post,
                Action::Admin => p.last_admin,
            };
            previous = last;
            if let Err(e) = gate(p, last, cooldown, now) {
                refused = Some(e);
                return;
            }
            match action {
                Action::Post => p.last_post = Some(now),
                Action::Admin => p.last_admin = Some(now),
            }
        })?;
        if let Some(e) = refused {
            debug!(identity, ?action, "refused: {e}");
            return Err(e);
        }
        Ok((previous, poster))
    }

    /// Sticky: there is no way back.
    pub fn ban(&self, identity: &str) -> Result<Poster> {
        let poster = self.repo.update(identity, &mut |p: &mut Poster| p.banned = true)?;
        info!(identity, "banned poster");
        Ok(poster)
    }
}
