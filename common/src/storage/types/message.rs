use uuid::Uuid;

use crate::stored_object;

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum MessageRole {
    Human,
    Ai,
}

stored_object!(Message, "message", {
    session_id: String,
    role: MessageRole,
    content: String
});

impl Message {
    pub fn new(session_id: String, role: MessageRole, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            session_id,
            role,
            content,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::Human => write!(f, "Human"),
            MessageRole::Ai => write!(f, "AI"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

pub fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|msg| format!("{msg}"))
        .collect::<Vec<String>>()
        .join("\n")
}

/// Bounded-context view: the last `limit` messages, oldest-first, for LLM consumption.
pub fn bounded_history(history: &[Message], limit: usize) -> &[Message] {
    if history.len() <= limit {
        history
    } else {
        &history[history.len() - limit..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn test_message_creation() {
        let session_id = "test_session";
        let content = "This is a test message";

        let message = Message::new(session_id.to_string(), MessageRole::Human, content.to_string());

        assert_eq!(message.session_id, session_id);
        assert_eq!(message.content, content);
        assert_eq!(message.role, MessageRole::Human);
        assert!(!message.id.is_empty());
    }

    #[tokio::test]
    async fn test_message_persistence() {
        let namespace = "test_ns";
        let database = &uuid::Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let session_id = "test_session";
        let message = Message::new(session_id.to_string(), MessageRole::Human, "Hello world".to_string());
        let message_id = message.id.clone();

        db.store_item(message.clone())
            .await
            .expect("Failed to store message");

        let retrieved: Option<Message> = db
            .get_item(&message_id)
            .await
            .expect("Failed to retrieve message");

        let retrieved = retrieved.expect("message present");
        assert_eq!(retrieved.id, message.id);
        assert_eq!(retrieved.session_id, message.session_id);
        assert_eq!(retrieved.role, message.role);
        assert_eq!(retrieved.content, message.content);
    }

    #[test]
    fn test_message_role_display() {
        assert_eq!(format!("{}", MessageRole::Human), "Human");
        assert_eq!(format!("{}", MessageRole::Ai), "AI");
    }

    #[test]
    fn bounded_history_keeps_only_the_tail() {
        let messages: Vec<Message> = (0..25)
            .map(|i| Message::new("s".into(), MessageRole::Human, format!("msg {i}")))
            .collect();

        let bounded = bounded_history(&messages, 20);
        assert_eq!(bounded.len(), 20);
        assert_eq!(bounded.first().unwrap().content, "msg 5");
        assert_eq!(bounded.last().unwrap().content, "msg 24");
    }

    #[test]
    fn bounded_history_is_noop_when_under_limit() {
        let messages: Vec<Message> = (0..3)
            .map(|i| Message::new("s".into(), MessageRole::Human, format!("msg {i}")))
            .collect();
        assert_eq!(bounded_history(&messages, 20).len(), 3);
    }

    #[test]
    fn test_format_history() {
        let messages = vec![
            Message::new("s".into(), MessageRole::Human, "Hello".into()),
            Message::new("s".into(), MessageRole::Ai, "Hi there!".into()),
        ];

        let formatted = format_history(&messages);
        assert_eq!(formatted, "Human: Hello\nAI: Hi there!");
    }
}
