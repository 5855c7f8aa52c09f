//! Access to the shared presence store.
//!
//! The forum application writes presence into Redis under a small key
//! layout: a sorted set of user ids scored by last-seen time, plus plain
//! string keys per user for the display name, the last-seen time and a
//! free-text description of what the user was doing. The snapshot builder
//! only needs two read primitives, expressed here as [`PresenceStore`].

use async_trait::async_trait;

use crate::error::StoreError;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Sorted set holding active user ids scored by last-seen epoch seconds.
pub const ACTIVE_USERS_KEY: &str = "au";

pub fn username_key(user_id: &str) -> String {
    format!("u:{user_id}:un")
}

pub fn doing_key(user_id: &str) -> String {
    format!("u:{user_id}:d")
}

pub fn last_seen_key(user_id: &str) -> String {
    format!("u:{user_id}:s")
}

#[async_trait]
pub trait PresenceStore: Send + Sync + 'static {
    /// Members of the sorted set at `key` with `min <= score <= max`, paired
    /// with their scores, in ascending score order.
    async fn range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// Values for `keys`, same length and order as the input. Missing keys
    /// come back as `None`.
    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;
}

/// Write side of presence tracking, used by whatever marks a user as seen.
#[async_trait]
pub trait ActivityRecorder: Send + Sync + 'static {
    async fn record_activity(&self, activity: &Activity) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub user_id: String,
    pub username: String,
    pub doing: String,
    pub seen: i64,
}

impl Activity {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        doing: impl Into<String>,
        seen: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            doing: doing.into(),
            seen,
        }
    }

    /// Appends a link to the item the user was looking at. `doing` is
    /// rendered as markup by browser clients, so both the target and the
    /// label are escaped.
    pub fn with_link(mut self, href: &str, label: &str) -> Self {
        self.doing = format!(
            "{} <a href=\"{}\">{}</a>",
            self.doing,
            escape_html(href),
            escape_html(label)
        );
        self
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Formats a score bound the way Redis expects it on the wire.
pub(crate) fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_owned()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_owned()
    } else {
        score.to_string()
    }
}
