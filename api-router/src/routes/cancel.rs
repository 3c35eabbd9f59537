use axum::{extract::State, response::IntoResponse, Json};
use common::storage::types::ingestion_job::IngestionJob;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

/// `POST cancel`: flips the job's cancellation flag; the orchestrator observes it at
/// its own checkpoints rather than being interrupted here.
pub async fn cancel(
    State(state): State<ApiState>,
    Json(body): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match IngestionJob::request_cancel(&body.job_id, &state.db).await {
        Ok(()) => Ok(Json(CancelResponse { ok: true })),
        Err(common::error::AppError::NotFound(_)) => Ok(Json(CancelResponse { ok: false })),
        Err(err) => Err(ApiError::from(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn request_cancel_on_unknown_job_is_not_found() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let result = IngestionJob::request_cancel("does-not-exist", &db).await;
        assert!(matches!(result, Err(common::error::AppError::NotFound(_))));
    }
}
