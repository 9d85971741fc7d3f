use crate::state::AppState;
use axum::extract::State;
use std::sync::Arc;

/// `GET /metrics` — Prometheus text exposition. Formatting is explicitly out of scope
/// for the core; this just renders whatever `metrics` recorded.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.prometheus.render()
}
