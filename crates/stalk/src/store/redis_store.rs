use std::time::Duration;

use async_trait::async_trait;
use log::info;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use super::{
    ACTIVE_USERS_KEY, Activity, ActivityRecorder, PresenceStore, doing_key, last_seen_key,
    score_arg, username_key,
};
use crate::error::StoreError;

/// Presence store backed by a Redis connection manager. Cloning is cheap and
/// shares the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager_with_config(config).await?;
        info!("connected to presence store at {redis_url}");

        Ok(Self { conn })
    }
}

#[async_trait]
impl PresenceStore for RedisStore {
    async fn range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<(String, f64)> = conn
            .zrangebyscore_withscores(key, score_arg(min), score_arg(max))
            .await?;
        Ok(members)
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }
}

#[async_trait]
impl ActivityRecorder for RedisStore {
    async fn record_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zadd(ACTIVE_USERS_KEY, &activity.user_id, activity.seen)
            .ignore()
            .set_nx(username_key(&activity.user_id), &activity.username)
            .ignore()
            .set(last_seen_key(&activity.user_id), activity.seen)
            .ignore()
            .set(doing_key(&activity.user_id), &activity.doing)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
