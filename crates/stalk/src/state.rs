use metrics_exporter_prometheus::PrometheusHandle;

use crate::snapshot::SnapshotCache;

#[derive(Clone)]
pub struct AppState {
    pub metrics: PrometheusHandle,
    pub snapshots: SnapshotCache,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, snapshots: SnapshotCache) -> Self {
        Self { metrics, snapshots }
    }
}
