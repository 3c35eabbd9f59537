use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::storage::types::session::new_session_id;
use futures::StreamExt;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: Option<String>,
    pub expediente_filter: Option<String>,
}

/// `{question, session_id, expediente_filter?}` → `text/event-stream`. A missing
/// `session_id` starts a fresh conversation under the caller's own id.
pub async fn query(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "question must not be empty".to_string(),
        ));
    }

    let session_id = body
        .session_id
        .unwrap_or_else(|| new_session_id(&user_id, chrono::Utc::now().timestamp_millis()));

    let frames = state
        .rag_chain
        .stream_answer(session_id, user_id, body.question, body.expediente_filter)
        .map(|frame| Ok::<_, std::convert::Infallible>(frame));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .map_err(|err| common::error::AppError::InternalError(err.to_string()))?;

    Ok(response)
}
