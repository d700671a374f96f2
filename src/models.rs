use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = i64;

/// A thread root (`parent == 0`) or a reply. Only roots carry replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Id,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub parent: Id,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub image: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub poster: String,
    pub posted: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Post>,
}

impl Post {
    pub fn is_thread(&self) -> bool {
        self.parent == 0
    }

    /// Id of the thread this post lives in.
    pub fn thread_id(&self) -> Id {
        if self.is_thread() { self.id } else { self.parent }
    }

    /// Filename stem shared by the full image and its thumbnail.
    pub fn image_key(&self) -> i64 {
        self.posted.timestamp_millis()
    }
}

/// Ledger entry for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poster {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_post: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_admin: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub banned: bool,
}

/// Raw submission as handed over by the routing layer.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub name: String,
    pub subject: String,
    pub body: String,
    /// 0 starts a new thread.
    pub parent: Id,
    pub image: Option<Vec<u8>>,
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub id: Id,
    pub thread: Id,
}

/// One page of the bump-ordered index.
#[derive(Debug, Clone)]
pub struct Page {
    pub threads: Vec<Post>,
    /// 1-based.
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Clone)]
pub enum ThreadLookup {
    Thread(Post),
    /// The id named a reply; callers usually redirect to `thread#reply`.
    Reply { thread: Id, reply: Id },
}

/// Current time at the millisecond resolution posts are stored with.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn is_zero(v: &Id) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}
