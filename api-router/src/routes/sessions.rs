use axum::{extract::Query, extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use common::{error::AppError, storage::types::session::Session};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub message_count: u32,
    pub expediente_numero: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            title: session.title,
            message_count: session.message_count,
            expediente_numero: session.expediente_numero,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// `GET sessions?user_id=...`: newest-first metadata records. Only the caller's own
/// sessions may be listed.
pub async fn list_sessions(
    State(state): State<ApiState>,
    Extension(UserId(caller)): Extension<UserId>,
    Query(params): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if caller != params.user_id {
        return Err(ApiError::Forbidden(
            "cannot list another user's sessions".to_string(),
        ));
    }

    let sessions = Session::list_for_user(&params.user_id, 100, &state.db).await?;
    let summaries: Vec<SessionSummary> = sessions.into_iter().map(SessionSummary::from).collect();
    Ok(Json(summaries))
}

#[derive(Debug, Deserialize)]
pub struct SessionIdQuery {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session: SessionSummary,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: common::storage::types::message::MessageRole,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `GET session?id=...`: 404 if missing, 403 if not the owner.
pub async fn get_session(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Query(params): Query<SessionIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, messages) = Session::get_complete(&params.id, &user_id, &state.db)
        .await
        .map_err(to_ownership_error)?;

    Ok(Json(SessionDetail {
        session: SessionSummary::from(session),
        messages: messages
            .into_iter()
            .map(|m| MessageView {
                role: m.role,
                content: m.content,
                created_at: m.created_at,
            })
            .collect(),
    }))
}

/// `DELETE session?id=...`: 204 on success, 403 if not the owner.
pub async fn delete_session(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Query(params): Query<SessionIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Session::delete(&params.id, &user_id, &state.db)
        .await
        .map_err(to_ownership_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Owner-mismatch failures surface as 403 on this interface rather than the
/// 401 the shared `AppError::Auth` variant maps to elsewhere.
fn to_ownership_error(err: AppError) -> ApiError {
    match err {
        AppError::Auth(msg) => ApiError::Forbidden(msg),
        other => ApiError::from(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_mismatch_maps_to_forbidden_not_unauthorized() {
        let err = to_ownership_error(AppError::Auth("not yours".to_string()));
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn not_found_passes_through_unchanged() {
        let err = to_ownership_error(AppError::NotFound("missing".to_string()));
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn session_summary_carries_expediente_filter() {
        let session = Session::new("session_u1_1".into(), "u1".into(), Some("21-004512-0166-PE".into()));
        let summary = SessionSummary::from(session);
        assert_eq!(summary.expediente_numero.as_deref(), Some("21-004512-0166-PE"));
    }
}
