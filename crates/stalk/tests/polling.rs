use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::CONTENT_TYPE},
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusBuilder;
use stalk::{
    app,
    builder::SnapshotBuilder,
    error::StoreError,
    scheduler::{ScheduleSettings, run_build_cycle, spawn_snapshot_scheduler},
    snapshot::SnapshotCache,
    state::AppState,
    store::{
        ACTIVE_USERS_KEY, Activity, ActivityRecorder, MemoryStore, PresenceStore, doing_key,
        username_key,
    },
};
use test_log::test;
use tower::ServiceExt;

const WINDOW: Duration = Duration::from_secs(30 * 60);
const TIMEOUT: Duration = Duration::from_secs(1);

fn router(cache: &SnapshotCache) -> Router {
    let recorder = PrometheusBuilder::new().build_recorder();
    app::router(AppState::new(recorder.handle(), cache.clone()))
}

async fn poll(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[test(tokio::test)]
async fn poll_before_first_build_serves_empty_array() {
    let cache = SnapshotCache::new();
    let (status, body) = poll(&router(&cache), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "callback([])");
}

#[test(tokio::test)]
async fn empty_active_set_polls_as_empty_array() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let cache = SnapshotCache::new();
    let builder = SnapshotBuilder::new(Arc::new(store), WINDOW);
    run_build_cycle(&builder, &cache, TIMEOUT).await?;

    let (_, body) = poll(&router(&cache), "/?callback=cb").await;
    assert_eq!(body, "cb([])");
    Ok(())
}

#[test(tokio::test)]
async fn poll_returns_users_most_recent_first() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let now = Utc::now().timestamp() as f64;
    store.zadd(ACTIVE_USERS_KEY, "userA", now - 200.0);
    store.zadd(ACTIVE_USERS_KEY, "userB", now - 100.0);
    store.set(&username_key("userB"), "bob");
    store.set(&doing_key("userB"), "coding");
    store.set(&username_key("userA"), "alice");

    let cache = SnapshotCache::new();
    let builder = SnapshotBuilder::new(Arc::new(store), WINDOW);
    run_build_cycle(&builder, &cache, TIMEOUT).await?;

    let router = router(&cache);
    let response = router
        .clone()
        .oneshot(Request::get("/?callback=foo").body(Body::empty())?)
        .await?;
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/javascript; charset=utf-8"
    );
    let body = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await?.to_vec())?;

    let json = body
        .strip_prefix("foo(")
        .and_then(|rest| rest.strip_suffix(')'))
        .expect("body should be wrapped in foo(...)");
    let users: serde_json::Value = serde_json::from_str(json)?;
    assert_eq!(users[0]["id"], "userB");
    assert_eq!(users[0]["username"], "bob");
    assert_eq!(users[0]["doing"], "coding");
    assert_eq!(users[1]["id"], "userA");
    assert_eq!(users[1]["username"], "alice");
    assert_eq!(users[1]["doing"], "");
    assert_eq!(users[1]["last_seen"].as_str().map(str::len), Some(24));
    Ok(())
}

#[test(tokio::test)]
async fn default_and_named_callbacks_wrap_the_same_payload() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store
        .record_activity(
            &Activity::new("7", "dave", "Viewing Topic:", Utc::now().timestamp())
                .with_link("/topic/1/", "Hello"),
        )
        .await?;

    let cache = SnapshotCache::new();
    let builder = SnapshotBuilder::new(Arc::new(store), WINDOW);
    run_build_cycle(&builder, &cache, TIMEOUT).await?;
    let router = router(&cache);

    let (_, default_body) = poll(&router, "/").await;
    let (_, named_body) = poll(&router, "/?callback=foo").await;

    let default_payload = default_body.strip_prefix("callback").unwrap();
    let named_payload = named_body.strip_prefix("foo").unwrap();
    assert_eq!(default_payload, named_payload);
    assert!(named_payload.contains("Viewing Topic: <a href=\\\"/topic/1/\\\">Hello</a>"));
    Ok(())
}

#[test(tokio::test)]
async fn unsafe_callback_is_rejected() {
    let cache = SnapshotCache::new();
    let router = router(&cache);

    let (status, body) = poll(&router, "/?callback=alert(document.cookie)%3Bfoo").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.contains("document.cookie"));

    let (status, _) = poll(&router, "/?callback=").await;
    assert_eq!(status, StatusCode::OK);
}

#[test(tokio::test)]
async fn repeated_callback_uses_the_first_value() {
    let cache = SnapshotCache::new();
    let router = router(&cache);

    let (status, body) = poll(&router, "/?callback=foo&callback=bar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "foo([])");

    let (status, body) = poll(&router, "/?_=123&callback=jQuery1_2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "jQuery1_2([])");

    let (status, body) = poll(&router, "/?callback").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "callback([])");
}

#[test(tokio::test)]
async fn serves_only_poll_and_metrics_routes() {
    let cache = SnapshotCache::new();
    let router = router(&cache);

    let (status, _) = poll(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    for path in ["/healthz", "/readyz"] {
        let (status, _) = poll(&router, path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path} should not be routed");
    }
}

#[test(tokio::test)]
async fn poll_does_not_wait_for_a_slow_store() {
    let store = MemoryStore::new();
    store.zadd(ACTIVE_USERS_KEY, "1", Utc::now().timestamp() as f64);
    store.set_latency(Duration::from_secs(2));

    let cache = SnapshotCache::new();
    let scheduler = spawn_snapshot_scheduler(
        SnapshotBuilder::new(Arc::new(store.clone()), WINDOW),
        cache.clone(),
        ScheduleSettings {
            interval: Duration::from_secs(5),
            build_timeout: Duration::from_secs(4),
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.range_calls(), 1, "a build should be in flight");

    let router = router(&cache);
    let started = Instant::now();
    let (status, body) = poll(&router, "/?callback=foo").await;
    scheduler.abort();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "foo([])");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test(tokio::test)]
async fn failing_store_keeps_serving_last_good_snapshot() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.zadd(ACTIVE_USERS_KEY, "1", Utc::now().timestamp() as f64);
    store.set(&username_key("1"), "erin");

    let cache = SnapshotCache::new();
    let builder = SnapshotBuilder::new(Arc::new(store.clone()), WINDOW);
    run_build_cycle(&builder, &cache, TIMEOUT).await?;
    let router = router(&cache);
    let (_, before) = poll(&router, "/").await;

    store.set_unavailable(true);
    assert!(run_build_cycle(&builder, &cache, TIMEOUT).await.is_err());

    let (status, after) = poll(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(before, after);
    assert!(after.contains("erin"));
    Ok(())
}

/// Counts how many range queries are in flight at once.
struct OverlapProbe {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

#[async_trait]
impl PresenceStore for OverlapProbe {
    async fn range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        let result = self.inner.range_by_score(key, min, max).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.inner.multi_get(keys).await
    }
}

#[test(tokio::test)]
async fn slow_cycles_never_overlap() {
    let probe = Arc::new(OverlapProbe {
        inner: MemoryStore::new(),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        latency: Duration::from_millis(60),
    });

    let cache = SnapshotCache::new();
    let scheduler = spawn_snapshot_scheduler(
        SnapshotBuilder::new(probe.clone(), WINDOW),
        cache.clone(),
        ScheduleSettings {
            interval: Duration::from_millis(10),
            build_timeout: Duration::from_secs(1),
        },
    );
    tokio::time::sleep(Duration::from_millis(400)).await;
    scheduler.abort();

    assert!(probe.inner.range_calls() >= 2);
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(cache.current().is_some());
}
