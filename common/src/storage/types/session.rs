use surrealdb::opt::PatchOp;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::message::Message;

pub const DEFAULT_TITLE: &str = "Nueva conversación";

stored_object!(Session, "session", {
    user_id: String,
    title: String,
    message_count: u32,
    expediente_numero: Option<String>
});

/// Format: `session_{user_id}_{epoch_ms}`.
pub fn new_session_id(user_id: &str, now_epoch_ms: i64) -> String {
    format!("session_{user_id}_{now_epoch_ms}")
}

/// On a miss in both layers, "infers `user_id` from the
/// session_id format". Returns `None` if the id doesn't match the expected shape.
pub fn user_id_from_session_id(session_id: &str) -> Option<String> {
    let rest = session_id.strip_prefix("session_")?;
    let (user_id, _epoch) = rest.rsplit_once('_')?;
    if user_id.is_empty() {
        return None;
    }
    Some(user_id.to_string())
}

impl Session {
    pub fn new(session_id: String, user_id: String, expediente_numero: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: session_id,
            created_at: now,
            updated_at: now,
            user_id,
            title: DEFAULT_TITLE.to_string(),
            message_count: 0,
            expediente_numero,
        }
    }

    pub async fn get_complete(
        session_id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(Self, Vec<Message>), AppError> {
        let session: Self = db
            .get_item(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if session.user_id != user_id {
            return Err(AppError::Auth(
                "You don't have access to this session".to_string(),
            ));
        }

        let messages: Vec<Message> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE session_id = $session_id ORDER BY created_at",
            )
            .bind(("table", Message::table_name()))
            .bind(("session_id", session_id.to_string()))
            .await?
            .take(0)?;

        Ok((session, messages))
    }

    pub async fn patch_title(
        id: &str,
        user_id: &str,
        new_title: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let session: Option<Self> = db.get_item(id).await?;
        let session = session.ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if session.user_id != user_id {
            return Err(AppError::Auth(
                "Unauthorized to update this session".to_string(),
            ));
        }

        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/title", new_title.to_string()))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;

        Ok(())
    }

    pub async fn bump_message_count(
        id: &str,
        new_count: u32,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/message_count", new_count))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    /// Title auto-generation: only fires while the title is still the default.
    pub fn generated_title(current_title: &str, first_user_message: &str) -> Option<String> {
        if current_title != DEFAULT_TITLE {
            return None;
        }
        let truncated: String = first_user_message.chars().take(60).collect();
        Some(format!("{truncated}..."))
    }

    /// Newest-first, bounded by `limit`.
    pub async fn list_for_user(
        user_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sessions: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE user_id = $user_id \
                 ORDER BY updated_at DESC LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await?
            .take(0)?;
        Ok(sessions)
    }

    pub async fn delete(id: &str, user_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let session: Option<Self> = db.get_item(id).await?;
        let session = session.ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        if session.user_id != user_id {
            return Err(AppError::Auth(
                "Unauthorized to delete this session".to_string(),
            ));
        }

        db.client
            .query("DELETE type::table($table) WHERE session_id = $session_id")
            .bind(("table", Message::table_name()))
            .bind(("session_id", id.to_string()))
            .await?
            .check()
            .map_err(AppError::Database)?;

        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::message::MessageRole;
    use uuid::Uuid;

    #[test]
    fn session_id_format_round_trips_user_id() {
        let sid = new_session_id("user-42", 1_700_000_000_000);
        assert_eq!(sid, "session_user-42_1700000000000");
        assert_eq!(user_id_from_session_id(&sid).as_deref(), Some("user-42"));
    }

    #[test]
    fn generated_title_only_applies_to_default_title() {
        assert_eq!(
            Session::generated_title(DEFAULT_TITLE, "hola, necesito ayuda con mi expediente"),
            Some("hola, necesito ayuda con mi expediente...".to_string())
        );
        assert_eq!(Session::generated_title("Custom title", "hola"), None);
    }

    #[tokio::test]
    async fn get_complete_rejects_other_users() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let sid = new_session_id("owner", 1);
        let session = Session::new(sid.clone(), "owner".into(), None);
        db.store_item(session).await.expect("store");

        let result = Session::get_complete(&sid, "intruder", &db).await;
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[tokio::test]
    async fn delete_removes_session_and_messages() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        let sid = new_session_id("owner", 1);
        let session = Session::new(sid.clone(), "owner".into(), None);
        db.store_item(session).await.expect("store");

        let msg = Message::new(sid.clone(), MessageRole::Human, "hola".into());
        db.store_item(msg).await.expect("store message");

        Session::delete(&sid, "owner", &db).await.expect("delete");

        let remaining: Option<Session> = db.get_item(&sid).await.unwrap();
        assert!(remaining.is_none());
    }
}
