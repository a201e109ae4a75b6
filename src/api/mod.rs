// src/api/mod.rs

//! Thin HTTP layer over the store and supervisor.
//!
//! Handlers only dispatch and serialize; all orchestration semantics live in
//! [`crate::supervisor`]. Request errors map onto status codes
//! (404 not-found, 409 already-running, 403 actions-disabled); snapshot
//! failures after successful writes are logged, never surfaced.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::error;

use crate::errors::HelmsmanError;
use crate::store::{HealthSample, Project, Store};
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub supervisor: Arc<Supervisor>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/", get(about))
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route(
            "/api/v1/projects/{id}",
            get(get_project).delete(delete_project),
        )
        .route("/api/v1/projects/{id}/start", post(start_project))
        .route("/api/v1/projects/{id}/stop", post(stop_project))
        .route("/api/v1/health/history", get(health_history))
        .with_state(state)
}

impl IntoResponse for HelmsmanError {
    fn into_response(self) -> Response {
        let code = match &self {
            HelmsmanError::NotFound(_) => StatusCode::NOT_FOUND,
            HelmsmanError::AlreadyRunning(_) => StatusCode::CONFLICT,
            HelmsmanError::ActionsDisabled => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn about(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "helmsman",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_s": state.started_at.elapsed().as_secs(),
    }))
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    Json(state.store.get_projects())
}

async fn create_project(
    State(state): State<AppState>,
    Json(project): Json<Project>,
) -> Response {
    if project.id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "id required" })),
        )
            .into_response();
    }
    state.store.add_project(project.clone());
    if let Err(err) = state.store.snapshot() {
        error!(error = %err, "snapshot after project upsert failed");
    }
    Json(project).into_response()
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, HelmsmanError> {
    state
        .store
        .get_project(&id)
        .map(Json)
        .ok_or(HelmsmanError::NotFound(id))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HelmsmanError> {
    state.supervisor.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HelmsmanError> {
    state.supervisor.start(&id)?;
    Ok(Json(json!({ "status": "started" })))
}

async fn stop_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HelmsmanError> {
    state.supervisor.stop(&id).await?;
    Ok(Json(json!({ "status": "stopped" })))
}

async fn health_history(State(state): State<AppState>) -> Json<Vec<HealthSample>> {
    Json(state.store.history())
}
