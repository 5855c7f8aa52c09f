use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use crate::error::StoreError;
use crate::snapshot::{Snapshot, UserPresence};
use crate::store::{ACTIVE_USERS_KEY, PresenceStore, doing_key, username_key};

/// Reads the active set and resolves each user into a [`Snapshot`].
#[derive(Clone)]
pub struct SnapshotBuilder {
    store: Arc<dyn PresenceStore>,
    window: Duration,
}

impl SnapshotBuilder {
    pub fn new(store: Arc<dyn PresenceStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn build(&self) -> Result<Snapshot, StoreError> {
        self.build_at(Utc::now()).await
    }

    /// Builds the snapshot as of `now`. Any store error aborts the build.
    pub async fn build_at(&self, now: DateTime<Utc>) -> Result<Snapshot, StoreError> {
        let since = now.timestamp_millis() as f64 / 1_000.0 - self.window.as_secs_f64();
        let mut active = self
            .store
            .range_by_score(ACTIVE_USERS_KEY, since, f64::INFINITY)
            .await?;

        if active.is_empty() {
            return Ok(Snapshot::empty(now));
        }

        // The store answers oldest first.
        active.reverse();
        debug!("{} active", active.len());

        let keys: Vec<String> = active
            .iter()
            .flat_map(|(id, _)| [username_key(id), doing_key(id)])
            .collect();
        let details = self.store.multi_get(&keys).await?;
        if details.len() != keys.len() {
            return Err(StoreError::MalformedReply {
                expected: keys.len(),
                actual: details.len(),
            });
        }

        let users = active
            .into_iter()
            .zip(details.chunks_exact(2))
            .map(|((id, score), pair)| UserPresence {
                id,
                seen: score.trunc() as i64,
                username: pair[0].clone().unwrap_or_default(),
                doing: pair[1].clone().unwrap_or_default(),
            })
            .collect();

        Ok(Snapshot {
            users,
            built_at: now,
        })
    }
}
