use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Payload served before the first successful build.
pub const EMPTY_PAYLOAD: &[u8] = b"[]";

const LAST_SEEN_FORMAT: &str = "%a %b %d %Y %H:%M:%S";
const LAST_SEEN_WIDTH: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresence {
    pub id: String,
    /// Epoch seconds, taken from the user's score in the active set.
    pub seen: i64,
    pub username: String,
    pub doing: String,
}

#[derive(Serialize)]
struct PresenceRecord<'a> {
    id: &'a str,
    seen: i64,
    username: &'a str,
    doing: &'a str,
    last_seen: String,
}

impl<'a> From<&'a UserPresence> for PresenceRecord<'a> {
    fn from(user: &'a UserPresence) -> Self {
        Self {
            id: &user.id,
            seen: user.seen,
            username: &user.username,
            doing: &user.doing,
            last_seen: format_last_seen(user.seen),
        }
    }
}

/// Renders `seen` as e.g. `Thu Oct 15 2026 09:41:07`, the prefix browsers
/// show for `new Date(seen * 1000).toString()`, in UTC.
pub fn format_last_seen(seen: i64) -> String {
    DateTime::<Utc>::from_timestamp(seen, 0)
        .map(|at| {
            at.format(LAST_SEEN_FORMAT)
                .to_string()
                .chars()
                .take(LAST_SEEN_WIDTH)
                .collect()
        })
        .unwrap_or_default()
}

/// Users active inside the window, most recently seen first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub users: Vec<UserPresence>,
    pub built_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn empty(built_at: DateTime<Utc>) -> Self {
        Self {
            users: Vec::new(),
            built_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// JSON array of the users. The build time is left out so that an
    /// unchanged store produces identical bytes.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        let records: Vec<PresenceRecord<'_>> = self.users.iter().map(Into::into).collect();
        serde_json::to_vec(&records).map(Bytes::from)
    }
}

#[derive(Debug, Clone)]
pub struct PublishedSnapshot {
    pub payload: Bytes,
    pub user_count: usize,
    pub built_at: DateTime<Utc>,
    pub captured_at: Instant,
    pub build_duration_ms: u64,
}

/// Single slot holding the latest published snapshot. Publishing swaps in a
/// whole new value; readers keep whichever value they loaded.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCache {
    slot: Arc<ArcSwapOption<PublishedSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: PublishedSnapshot) {
        self.slot.store(Some(Arc::new(snapshot)));
    }

    pub fn current(&self) -> Option<Arc<PublishedSnapshot>> {
        self.slot.load_full()
    }

    pub fn payload_or_empty(&self) -> Bytes {
        self.current()
            .map(|published| published.payload.clone())
            .unwrap_or_else(|| Bytes::from_static(EMPTY_PAYLOAD))
    }
}
