use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ACTIVE_USERS_KEY, Activity, ActivityRecorder, PresenceStore, doing_key, last_seen_key,
    username_key,
};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryState {
    sorted_sets: HashMap<String, HashMap<String, f64>>,
    values: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Mutex<MemoryState>,
    latency: Mutex<Duration>,
    unavailable: AtomicBool,
    range_calls: AtomicUsize,
    multi_get_calls: AtomicUsize,
}

/// In-process stand-in for the presence store. Orders equal scores by
/// member like Redis does, and can be told to respond slowly or fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zadd(&self, key: &str, member: &str, score: f64) {
        self.inner
            .state
            .lock()
            .sorted_sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned(), score);
    }

    pub fn zrem(&self, key: &str, member: &str) {
        if let Some(set) = self.inner.state.lock().sorted_sets.get_mut(key) {
            set.remove(member);
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.inner
            .state
            .lock()
            .values
            .insert(key.to_owned(), value.to_owned());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.state.lock().values.get(key).cloned()
    }

    /// Delays every read by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// While unavailable every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn range_calls(&self) -> usize {
        self.inner.range_calls.load(Ordering::SeqCst)
    }

    pub fn multi_get_calls(&self) -> usize {
        self.inner.multi_get_calls.load(Ordering::SeqCst)
    }

    async fn simulate_round_trip(&self) -> Result<(), StoreError> {
        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.inner.range_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip().await?;

        let state = self.inner.state.lock();
        let mut members: Vec<(String, f64)> = state
            .sorted_sets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, score)| **score >= min && **score <= max)
                    .map(|(member, score)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.inner.multi_get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_round_trip().await?;

        let state = self.inner.state.lock();
        Ok(keys.iter().map(|key| state.values.get(key).cloned()).collect())
    }
}

#[async_trait]
impl ActivityRecorder for MemoryStore {
    async fn record_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        self.simulate_round_trip().await?;

        let mut state = self.inner.state.lock();
        state
            .sorted_sets
            .entry(ACTIVE_USERS_KEY.to_owned())
            .or_default()
            .insert(activity.user_id.clone(), activity.seen as f64);
        state
            .values
            .entry(username_key(&activity.user_id))
            .or_insert_with(|| activity.username.clone());
        state
            .values
            .insert(last_seen_key(&activity.user_id), activity.seen.to_string());
        state
            .values
            .insert(doing_key(&activity.user_id), activity.doing.clone());
        Ok(())
    }
}
