//! Read-only views of the location catalog.

use axum::Json;
use axum::extract::{Path, State};

use super::{ApiError, AppState};

pub async fn states_handler(State(app_state): State<AppState>) -> Json<Vec<String>> {
    Json(
        app_state
            .catalog()
            .states()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}

/// Cities of one state, in catalog order.
pub async fn cities_handler(
    State(app_state): State<AppState>,
    Path(state): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let cities = app_state.catalog().cities(&state);
    if cities.is_empty() {
        return Err(ApiError::UnknownState(state));
    }
    Ok(Json(cities.into_iter().map(str::to_string).collect()))
}
