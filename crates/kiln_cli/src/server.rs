//! HTTP surface of `kiln serve`.
//!
//! `POST /api/generate` answers with a server-sent event stream that mirrors
//! the pipeline's [`PipelineEvent`]s; the remaining routes inspect sessions
//! and tear down running projects.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use kiln_runner::ServerHandle;
use kiln_session::{GenerateRequest, GenerationSession, Pipeline, PipelineEvent, SessionError, StageLog};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:chat_id", get(get_session))
        .route("/api/sessions/:chat_id/stages", get(get_stages))
        .route("/api/projects", get(list_projects))
        .route("/api/projects/:project_id/stop", post(stop_project))
        .with_state(state)
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::ProjectBusy { .. } => StatusCode::CONFLICT,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn to_sse(event: PipelineEvent) -> Event {
    Event::default().event(event.name()).data(event.to_json())
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let run = state.pipeline.start(request)?;
    info!("Streaming session {} ({})", run.chat_id, run.project_id);

    let stream = ReceiverStream::new(run.events).map(|event| Ok::<Event, Infallible>(to_sse(event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "activeSessions": state.pipeline.sessions().len(),
        "runningProjects": state.pipeline.orchestrator().list().len(),
    }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Vec<GenerationSession>> {
    Json(state.pipeline.sessions().list())
}

async fn get_session(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<GenerationSession>, ApiError> {
    Ok(Json(state.pipeline.session(&chat_id)?))
}

async fn get_stages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<StageLog>>, ApiError> {
    let stages = state.pipeline.stages(&chat_id)?;
    if stages.is_empty() {
        return Err(ApiError::not_found(format!("No stage logs for {}", chat_id)));
    }
    Ok(Json(stages))
}

async fn list_projects(State(state): State<AppState>) -> Json<Vec<ServerHandle>> {
    Json(state.pipeline.orchestrator().list())
}

async fn stop_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.pipeline.orchestrator().stop(&project_id).await {
        return Err(ApiError::not_found(format!("Project not running: {}", project_id)));
    }
    info!("Stopped project {} on request", project_id);
    Ok(Json(json!({ "projectId": project_id, "stopped": true })))
}
