use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::types::InvalidCategory;

/// Errors returned by the inspection endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The name is well formed but not a configured category.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("{0}")]
    InvalidCategory(#[from] InvalidCategory),

    /// The state does not appear in the catalog.
    #[error("unknown state: {0}")]
    UnknownState(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::UnknownCategory(_) | ApiError::UnknownState(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidCategory(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
