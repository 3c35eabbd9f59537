use axum::{extract::Query, extract::State, response::IntoResponse, Json};
use ingestion_pipeline::progress::ProgressTracker;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub task_id: String,
    pub status: &'static str,
    pub progress: u8,
    pub message: String,
    pub error_details: Option<String>,
    pub elapsed_seconds: i64,
    pub is_finished: bool,
}

/// `GET progress?job_id=...`: 404 once the job's TTL has expired.
pub async fn get_progress(
    State(state): State<ApiState>,
    Query(params): Query<ProgressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tracker = ProgressTracker::new(params.job_id.clone(), &state.db);
    let job = tracker
        .fetch(state.config.progress_ttl_seconds)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {} not found", params.job_id)))?;

    let status = match job.state {
        common::storage::types::ingestion_job::JobState::Pendiente => "pendiente",
        common::storage::types::ingestion_job::JobState::Procesando => "procesando",
        common::storage::types::ingestion_job::JobState::Completado => "completado",
        common::storage::types::ingestion_job::JobState::Fallido => "fallido",
        common::storage::types::ingestion_job::JobState::Cancelado => "cancelado",
    };

    let elapsed_seconds = job.elapsed().num_seconds();
    let is_finished = job.state.is_terminal();

    Ok(Json(ProgressResponse {
        task_id: job.id,
        status,
        progress: job.progress,
        message: job.message,
        error_details: job.error_details,
        elapsed_seconds,
        is_finished,
    }))
}
