//! Optional HTTP status and control surface for a running harvest.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /api/v1/progress` - Counters, current category and failure breakdown
//! - `POST /api/v1/stop` - Requests cooperative cancellation (202 Accepted)
//! - `GET /api/v1/catalog/states` - States in catalog order
//! - `GET /api/v1/catalog/states/{state}/cities` - Cities of a state
//! - `GET /api/v1/categories/{category}/records` - Stored records
//! - `GET /api/v1/categories/{category}/count` - Number of stored records

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod catalog;
pub mod error;
pub mod health;
pub mod progress;
pub mod records;

pub use catalog::{cities_handler, states_handler};
pub use error::ApiError;
pub use health::health_handler;
pub use progress::{ProgressView, progress_handler, stop_handler};
pub use records::{RecordCount, count_handler, records_handler};

use crate::catalog::WorkCatalog;
use crate::dispatch::RunContext;
use crate::persistence::{DedupStore, ProgressStore};
use crate::types::Category;

/// Shared application state.
///
/// Handlers see the same catalog, stores and run context as the harvester,
/// so progress and stop requests reflect the live run.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Arc<WorkCatalog>,
    progress: Arc<ProgressStore>,
    dedup: Arc<DedupStore>,
    ctx: Arc<RunContext>,
    categories: Vec<Category>,
}

impl AppState {
    pub fn new(
        catalog: Arc<WorkCatalog>,
        progress: Arc<ProgressStore>,
        dedup: Arc<DedupStore>,
        ctx: Arc<RunContext>,
        categories: Vec<Category>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                catalog,
                progress,
                dedup,
                ctx,
                categories,
            }),
        }
    }

    pub fn catalog(&self) -> &WorkCatalog {
        &self.inner.catalog
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.inner.progress
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.inner.dedup
    }

    pub fn context(&self) -> &RunContext {
        &self.inner.ctx
    }

    pub fn categories(&self) -> &[Category] {
        &self.inner.categories
    }

    /// Parses `name` and checks it against the configured categories.
    pub fn resolve_category(&self, name: &str) -> Result<Category, ApiError> {
        let category = Category::parse(name)?;
        if self.inner.categories.contains(&category) {
            Ok(category)
        } else {
            Err(ApiError::UnknownCategory(category.to_string()))
        }
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/progress", get(progress_handler))
        .route("/api/v1/stop", post(stop_handler))
        .route("/api/v1/catalog/states", get(states_handler))
        .route("/api/v1/catalog/states/{state}/cities", get(cities_handler))
        .route("/api/v1/categories/{category}/records", get(records_handler))
        .route("/api/v1/categories/{category}/count", get(count_handler))
        .with_state(app_state)
}

/// Serves the router on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app_state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Status server listening");
    }
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::types::{DedupFields, ResultRecord, WorkItem};

    fn test_app_state(dir: &std::path::Path) -> AppState {
        let catalog = WorkCatalog::from_items(
            vec![
                WorkItem::new("CA", "Fresno", "93650"),
                WorkItem::new("CA", "Oakland", "94601"),
                WorkItem::new("NV", "Reno", "89501"),
            ],
            10,
        );
        AppState::new(
            Arc::new(catalog),
            Arc::new(ProgressStore::in_memory()),
            Arc::new(DedupStore::new(dir, DedupFields::default())),
            Arc::new(RunContext::default()),
            Category::defaults(),
        )
    }

    async fn get(app_state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = build_router(app_state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_200() {
        let dir = tempdir().unwrap();
        let (status, body) = get(test_app_state(dir.path()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"OK");
    }

    // ─── Progress and stop ───

    #[tokio::test]
    async fn progress_reports_counters_and_current_category() {
        let dir = tempdir().unwrap();
        let state = test_app_state(dir.path());
        state.progress().record_success();
        state.progress().record_failure();
        state
            .context()
            .set_current_category(Some(Category::parse("optometry").unwrap()));

        let (status, body) = get(state, "/api/v1/progress").await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["counters"]["total_processed"], 2);
        assert_eq!(json["counters"]["successful"], 1);
        assert_eq!(json["current_category"], "optometry");
        assert_eq!(json["cancelled"], false);
    }

    #[tokio::test]
    async fn stop_cancels_the_run() {
        let dir = tempdir().unwrap();
        let state = test_app_state(dir.path());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/stop")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(state.context().is_cancelled());
    }

    // ─── Catalog ───

    #[tokio::test]
    async fn states_are_listed_in_catalog_order() {
        let dir = tempdir().unwrap();
        let (status, body) = get(test_app_state(dir.path()), "/api/v1/catalog/states").await;
        assert_eq!(status, StatusCode::OK);
        let states: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(states, vec!["CA", "NV"]);
    }

    #[tokio::test]
    async fn cities_of_a_state() {
        let dir = tempdir().unwrap();
        let (status, body) = get(test_app_state(dir.path()), "/api/v1/catalog/states/CA/cities").await;
        assert_eq!(status, StatusCode::OK);
        let cities: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(cities, vec!["Fresno", "Oakland"]);
    }

    #[tokio::test]
    async fn cities_of_unknown_state_returns_404() {
        let dir = tempdir().unwrap();
        let (status, _) = get(test_app_state(dir.path()), "/api/v1/catalog/states/ZZ/cities").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ─── Records ───

    #[tokio::test]
    async fn records_and_count_reflect_the_dedup_store() {
        let dir = tempdir().unwrap();
        let state = test_app_state(dir.path());
        let category = Category::parse("optometry").unwrap();
        state
            .dedup()
            .commit(
                vec![
                    ResultRecord::new().with("company_name", "Acme").with("website", "a.com"),
                    ResultRecord::new().with("company_name", "Bolt").with("website", "b.com"),
                ],
                &category,
            )
            .await;

        let (status, body) = get(state.clone(), "/api/v1/categories/optometry/count").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["count"], 2);

        let (status, body) = get(state, "/api/v1/categories/optometry/records").await;
        assert_eq!(status, StatusCode::OK);
        let records: Vec<ResultRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("company_name"), Some("Acme"));
    }

    #[tokio::test]
    async fn unconfigured_category_returns_404() {
        let dir = tempdir().unwrap();
        let (status, _) = get(test_app_state(dir.path()), "/api/v1/categories/plumbing/count").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_category_returns_400() {
        let dir = tempdir().unwrap();
        let (status, _) = get(test_app_state(dir.path()), "/api/v1/categories/a%20b/records").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
