//! Daemon status endpoint.

use axum::Json;
use axum::extract::State;

use homehub_app::ports::DeviceStore;
use homehub_domain::status::DaemonStatus;

use crate::state::AppState;

/// `GET /api/status`
///
/// Answers in every lifecycle state, including before initialization.
pub async fn get<S: DeviceStore>(State(state): State<AppState<S>>) -> Json<DaemonStatus> {
    Json(state.daemon.get_status().await)
}
