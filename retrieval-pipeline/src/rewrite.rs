//! History-aware query rewriting. Expands the user's latest question with legal
//! synonyms and, where the conversation already names an expediente, resolves positional
//! references ("ese expediente", "el ultimo caso") against it. Never fails the surrounding
//! chain: any LLM error falls back to the original question unchanged.

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use common::storage::{
    db::SurrealDbClient,
    types::{message::Message, system_settings::SystemSettings},
};
use tracing::warn;

const SYSTEM_PROMPT: &str = "Eres un asistente que reformula preguntas de usuarios sobre \
expedientes judiciales costarricenses para mejorar la busqueda semantica. Expande la \
pregunta con sinonimos legales y variantes de escritura relevantes (3 a 5). Si el historial \
de la conversacion menciona un numero de expediente y la pregunta actual usa una referencia \
posicional (\"ese expediente\", \"el ultimo caso\", \"dicho caso\"), reemplaza la referencia \
por el numero de expediente exacto tal como aparece en el historial; nunca inventes un \
numero de expediente. Si no hay historial relevante, simplemente expande la pregunta con \
sinonimos y marcadores jurisdiccionales (\"expedientes costarricenses\"). Responde unicamente \
con la pregunta reformulada, sin explicaciones ni comillas.";

/// Rewrites `question` using `history` for context. On any OpenAI failure, logs a warning
/// and returns `question` unchanged — the retriever must always receive something usable.
pub async fn rewrite_query(
    openai_client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    db: &SurrealDbClient,
    history: &[Message],
    question: &str,
) -> String {
    match try_rewrite(openai_client, db, history, question).await {
        Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
        Ok(_) => question.to_string(),
        Err(err) => {
            warn!(error = %err, "query rewrite failed; falling back to original question");
            question.to_string()
        }
    }
}

async fn try_rewrite(
    openai_client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    db: &SurrealDbClient,
    history: &[Message],
    question: &str,
) -> Result<String, common::error::AppError> {
    let settings = SystemSettings::get_current(db).await?;

    let history_block = if history.is_empty() {
        "Sin historial previo.".to_string()
    } else {
        common::storage::types::message::format_history(history)
    };

    let user_message = format!(
        "Historial de la conversacion:\n==================\n{history_block}\n\n\
         Pregunta actual:\n==================\n{question}"
    );

    let request = CreateChatCompletionRequestArgs::default()
        .model(&settings.query_model)
        .temperature(0.0)
        .messages([
            ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT).into(),
            ChatCompletionRequestUserMessage::from(user_message).into(),
        ])
        .build()?;

    let response = openai_client.chat().create(request).await?;
    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone())
        .unwrap_or_default();

    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::message::MessageRole;

    #[tokio::test]
    async fn rewrite_query_falls_back_on_unreachable_backend() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_base("http://127.0.0.1:1")
            .with_api_key("test-key");
        let client = async_openai::Client::with_config(config);

        let history = vec![Message::new(
            "s1".into(),
            MessageRole::Human,
            "Consulta sobre el expediente 21-004512-0166-PE".into(),
        )];

        let rewritten = rewrite_query(&client, &db, &history, "que paso con ese expediente?").await;
        assert_eq!(rewritten, "que paso con ese expediente?");
    }
}
