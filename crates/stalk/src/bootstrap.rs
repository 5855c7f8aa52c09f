use std::sync::Arc;

use anyhow::Context;
use log::info;

use crate::app;
use crate::builder::SnapshotBuilder;
use crate::config::StalkConfig;
use crate::scheduler::{self, ScheduleSettings};
use crate::server;
use crate::snapshot::SnapshotCache;
use crate::state::AppState;
use crate::store::RedisStore;
use crate::telemetry;

pub async fn run() -> anyhow::Result<()> {
    let cfg = load_config()?;
    telemetry::init_logger(cfg.log_level);
    info!(
        "stalk config: bind_addr={}, redis={}:{}/{}, window_minutes={}, build_interval_sec={}, build_timeout_ms={}",
        cfg.bind_addr(),
        cfg.redis_host,
        cfg.redis_port,
        cfg.redis_db,
        cfg.window_minutes,
        cfg.build_interval_sec,
        cfg.build_timeout_ms
    );

    let metrics = telemetry::install_metrics_recorder()?;
    telemetry::emit_startup_metrics();

    let store = RedisStore::connect(&cfg.redis_url())
        .await
        .context("Failed to connect to the presence store")?;

    let snapshots = SnapshotCache::new();
    let builder = SnapshotBuilder::new(Arc::new(store), cfg.window());
    let scheduler = scheduler::spawn_snapshot_scheduler(
        builder,
        snapshots.clone(),
        ScheduleSettings {
            interval: cfg.build_interval(),
            build_timeout: cfg.build_timeout(),
        },
    );

    let state = AppState::new(metrics, snapshots);
    let app = app::router(state);

    let result = server::serve(&cfg.bind_addr(), app).await;
    scheduler.abort();
    telemetry::emit_shutdown_metrics();
    result
}

fn load_config() -> anyhow::Result<StalkConfig> {
    dotenv::dotenv()
        .map_err(|err| {
            eprintln!(".env file error: {err}");
            err
        })
        .ok();

    StalkConfig::fetch()
}
