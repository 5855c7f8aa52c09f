use std::time::Duration;

use anyhow::Context;
use env_logger::Env;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn init_logger(level: log::Level) {
    env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str())).init();
}

pub fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .add_global_label("app", "stalk")
        .install_recorder()
        .context("Failed to install metrics recorder")
}

pub fn emit_startup_metrics() {
    metrics::gauge!("stalk_up").set(1.0);
    metrics::counter!("stalk_start_total").increment(1);
}

pub fn emit_shutdown_metrics() {
    metrics::gauge!("stalk_up").set(0.0);
}

pub fn record_build_duration(duration: Duration) {
    metrics::histogram!("stalk_build_duration_seconds").record(duration.as_secs_f64());
}

pub fn increment_build_failures() {
    metrics::counter!("stalk_build_failures_total").increment(1);
}

pub fn set_active_users(count: usize) {
    metrics::gauge!("stalk_active_users").set(count as f64);
}

pub fn set_snapshot_age_seconds(age_seconds: f64) {
    metrics::gauge!("stalk_snapshot_age_seconds").set(age_seconds);
}

pub fn increment_polls() {
    metrics::counter!("stalk_polls_total").increment(1);
}

pub fn increment_rejected_polls() {
    metrics::counter!("stalk_rejected_polls_total").increment(1);
}
