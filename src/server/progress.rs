//! Run progress and control.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::info;

use super::AppState;
use crate::dispatch::FailureBreakdown;
use crate::persistence::ProgressCounters;
use crate::types::Category;

/// Body of `GET /api/v1/progress`.
#[derive(Debug, Serialize)]
pub struct ProgressView {
    pub counters: ProgressCounters,
    /// Category being processed, if a run is active.
    pub current_category: Option<Category>,
    pub failures: FailureBreakdown,
    pub cancelled: bool,
}

pub async fn progress_handler(State(app_state): State<AppState>) -> Json<ProgressView> {
    let ctx = app_state.context();
    Json(ProgressView {
        counters: app_state.progress().snapshot(),
        current_category: ctx.current_category(),
        failures: ctx.breakdown(),
        cancelled: ctx.is_cancelled(),
    })
}

/// Requests cooperative cancellation. Units in flight finish and are
/// committed before the run stops.
pub async fn stop_handler(State(app_state): State<AppState>) -> (StatusCode, &'static str) {
    if !app_state.context().is_cancelled() {
        info!("Stop requested over HTTP");
        app_state.context().cancel();
    }
    (StatusCode::ACCEPTED, "stopping")
}
