//! Stored records per category.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use super::{ApiError, AppState};
use crate::types::{Category, ResultRecord};

#[derive(Debug, Serialize)]
pub struct RecordCount {
    pub category: Category,
    pub count: usize,
}

pub async fn records_handler(
    State(app_state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<ResultRecord>>, ApiError> {
    let category = app_state.resolve_category(&category)?;
    Ok(Json(app_state.dedup().all_records(&category)))
}

pub async fn count_handler(
    State(app_state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<RecordCount>, ApiError> {
    let category = app_state.resolve_category(&category)?;
    let count = app_state.dedup().count(&category);
    Ok(Json(RecordCount { category, count }))
}
