//! Read-mostly HTTP API over the run store.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    gpx_export::{encode_run_as_gpx, GpxError},
    models::{ApiError, Route, RunRecord, UserProfile},
    storage::{RunStore, StoreError},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GpxExport {
    pub run_id: String,
    pub gpx_base64: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/runs", get(list_runs))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/gpx", get(export_run_gpx))
        .route("/api/routes", get(list_routes).post(save_route))
        .route("/api/routes/:id", get(get_route))
        .route("/api/profile", get(profile))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/runs - Most recent first
async fn list_runs(State(state): State<AppState>) -> ApiResult<Vec<RunRecord>> {
    state
        .store
        .list_runs()
        .await
        .map(Json)
        .map_err(store_error_to_api_error)
}

async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<RunRecord> {
    state
        .store
        .get_run(&id)
        .await
        .map(Json)
        .map_err(store_error_to_api_error)
}

/// GET /api/runs/:id/gpx - Recorded path as a base64 GPX document
async fn export_run_gpx(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<GpxExport> {
    let run = state
        .store
        .get_run(&id)
        .await
        .map_err(store_error_to_api_error)?;
    let gpx_base64 = encode_run_as_gpx(&run).map_err(gpx_error_to_api_error)?;
    Ok(Json(GpxExport {
        run_id: run.id,
        gpx_base64,
    }))
}

async fn list_routes(State(state): State<AppState>) -> ApiResult<Vec<Route>> {
    state
        .store
        .list_routes()
        .await
        .map(Json)
        .map_err(store_error_to_api_error)
}

async fn get_route(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Route> {
    state
        .store
        .get_route(&id)
        .await
        .map(Json)
        .map_err(store_error_to_api_error)
}

/// POST /api/routes - Save a planned route
async fn save_route(
    State(state): State<AppState>,
    Json(route): Json<Route>,
) -> Result<(StatusCode, Json<Route>), (StatusCode, Json<ApiError>)> {
    if route.name.trim().is_empty() {
        return Err(bad_request("route name is required"));
    }
    if route.path.len() < 2 || !route.path.iter().all(|c| c.is_valid()) {
        return Err(bad_request("route path needs at least two valid coordinates"));
    }
    state
        .store
        .save_route(&route)
        .await
        .map_err(store_error_to_api_error)?;
    Ok((StatusCode::CREATED, Json(route)))
}

async fn profile(State(state): State<AppState>) -> ApiResult<UserProfile> {
    state
        .store
        .profile()
        .await
        .map(Json)
        .map_err(store_error_to_api_error)
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            message: message.to_string(),
        }),
    )
}

fn store_error_to_api_error(err: StoreError) -> (StatusCode, Json<ApiError>) {
    let status = match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Io { .. } | StoreError::Serde { .. } => {
            tracing::error!("Store error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}

fn gpx_error_to_api_error(err: GpxError) -> (StatusCode, Json<ApiError>) {
    tracing::error!("GPX export failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}
