use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use queue_core::{JobView, ModelStatus, QueueError};
use serde::Deserialize;
use storage::ARTIFACT_CONTENT_TYPE;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// GET /model-status
async fn model_status(State(state): State<AppState>) -> ApiResult<Json<ModelStatus>> {
    Ok(Json(state.producer.model_status().await?))
}

/// POST /generate -- 202 with the queued job's view.
async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let Json(request) = payload.map_err(|e| QueueError::InvalidInput(e.body_text()))?;
    let prompt = request.prompt.unwrap_or_default();
    let view = state.producer.submit(&prompt).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

/// GET /jobs/{job_id}
async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobView>> {
    Ok(Json(state.producer.poll(&job_id).await?))
}

/// GET /files/{job_id}/out.mp4 -- streams the finished video.
async fn get_artifact(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Response> {
    let artifact = state.producer.fetch_artifact(&job_id).await?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(ARTIFACT_CONTENT_TYPE)),
        (header::CONTENT_LENGTH, HeaderValue::from(artifact.size)),
    ];
    Ok((headers, Body::from_stream(artifact.stream)).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/model-status", get(model_status))
        .route("/generate", post(generate))
        .route("/jobs/{job_id}", get(get_job))
        .route("/files/{job_id}/out.mp4", get(get_artifact))
}
