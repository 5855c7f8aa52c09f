use axum::{Router, routing::get};

use crate::handlers::{get_metrics, get_poll};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_poll))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}
