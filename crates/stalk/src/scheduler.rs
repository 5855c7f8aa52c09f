use std::time::{Duration, Instant};

use log::{debug, error, info};
use tokio::time::MissedTickBehavior;

use crate::builder::SnapshotBuilder;
use crate::error::BuildError;
use crate::snapshot::{PublishedSnapshot, SnapshotCache};
use crate::telemetry;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub interval: Duration,
    pub build_timeout: Duration,
}

pub fn spawn_snapshot_scheduler(
    builder: SnapshotBuilder,
    cache: SnapshotCache,
    settings: ScheduleSettings,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run_scheduler_loop(builder, cache, settings).await;
    })
}

async fn run_scheduler_loop(
    builder: SnapshotBuilder,
    cache: SnapshotCache,
    settings: ScheduleSettings,
) {
    let interval_duration = settings.interval.max(MIN_INTERVAL);
    info!(
        "starting snapshot scheduler with interval {:?}, build timeout {:?}, window {:?}",
        interval_duration,
        settings.build_timeout,
        builder.window()
    );

    // Cycles run inline, so a slow cycle delays the next tick instead of
    // overlapping it; ticks missed meanwhile are dropped.
    let mut ticker = tokio::time::interval(interval_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_user_count = None;
    loop {
        ticker.tick().await;
        publish_snapshot_age(&cache);
        if let Some(count) =
            run_and_publish_build_cycle(&builder, &cache, settings.build_timeout).await
        {
            if last_user_count != Some(count) {
                info!("{count} active");
            }
            last_user_count = Some(count);
        }
    }
}

async fn run_and_publish_build_cycle(
    builder: &SnapshotBuilder,
    cache: &SnapshotCache,
    build_timeout: Duration,
) -> Option<usize> {
    match run_build_cycle(builder, cache, build_timeout).await {
        Ok(published) => {
            telemetry::record_build_duration(Duration::from_millis(published.build_duration_ms));
            telemetry::set_active_users(published.user_count);
            telemetry::set_snapshot_age_seconds(0.0);
            debug!(
                "published snapshot with {} users in {}ms",
                published.user_count, published.build_duration_ms
            );
            Some(published.user_count)
        }
        Err(err) => {
            telemetry::increment_build_failures();
            error!("snapshot build failed, keeping previous snapshot: {err:#}");
            None
        }
    }
}

fn publish_snapshot_age(cache: &SnapshotCache) {
    if let Some(latest) = cache.current() {
        telemetry::set_snapshot_age_seconds(latest.captured_at.elapsed().as_secs_f64());
    }
}

/// Runs one build under `build_timeout` and publishes the result. The cache
/// is left untouched unless the whole build succeeds.
pub async fn run_build_cycle(
    builder: &SnapshotBuilder,
    cache: &SnapshotCache,
    build_timeout: Duration,
) -> Result<PublishedSnapshot, BuildError> {
    let started = Instant::now();
    let snapshot = tokio::time::timeout(build_timeout, builder.build())
        .await
        .map_err(|_| BuildError::DeadlineExceeded(build_timeout))??;
    let payload = snapshot.to_payload()?;

    let published = PublishedSnapshot {
        payload,
        user_count: snapshot.users.len(),
        built_at: snapshot.built_at,
        captured_at: Instant::now(),
        build_duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    cache.publish(published.clone());
    Ok(published)
}
