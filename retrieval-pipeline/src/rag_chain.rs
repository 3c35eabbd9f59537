//! RagChain: composes the history-aware retriever (rewrite -> retrieve -> format) with
//! a streaming answer generation step and session persistence. The two query modes —
//! general corpus and expediente-scoped — share this composition; only the system prompt
//! and retriever params differ.

use std::{collections::HashMap, sync::Arc};

use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::Document,
            message::{bounded_history, format_history, Message, MessageRole},
            session::Session,
            system_settings::SystemSettings,
        },
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use futures::{Stream, StreamExt};
use json_stream_parser::{SseFrame, ThinkingFilter};
use tracing::{error, warn};

use crate::{
    formatting,
    retrieve::{self, RetrieverParams},
    rewrite,
};

const NO_RELEVANT_INFO_MESSAGE: &str = "No se encontro informacion relevante en los documentos \
disponibles para responder esta pregunta. Intente reformular su consulta o verifique que el \
expediente este correctamente indexado.";

const GENERAL_SYSTEM_PROMPT: &str = "Eres un asistente legal que responde preguntas sobre \
expedientes judiciales costarricenses usando unicamente el contexto proporcionado. Responde \
siempre en espanol. Cita el expediente y el archivo de origen para cada afirmacion relevante. \
Si el contexto no contiene informacion suficiente, dilo explicitamente y sugiere como \
refinar la consulta. Si se te proporciona la estructura de un documento plantilla, sigue esa \
estructura en tu respuesta. Termina tu respuesta con una seccion '**FUENTES:**' listando, por \
linea, '- Expediente NUM: (ruta del archivo)' para cada fuente citada.";

const EXPEDIENTE_SYSTEM_PROMPT: &str = "Eres un asistente legal que responde preguntas sobre \
UN UNICO expediente judicial costarricense usando unicamente el contexto proporcionado. Nunca \
menciones ni mezcles contenido de otros expedientes. Responde siempre en espanol. Cita el \
archivo de origen dentro del expediente para cada afirmacion relevante. Si el contexto no \
contiene informacion suficiente, dilo explicitamente y sugiere como refinar la consulta. Si se \
te proporciona la estructura de un documento plantilla, sigue esa estructura en tu respuesta. \
Termina tu respuesta con una seccion '**FUENTES:**' listando, por linea, \
'- Expediente NUM: (ruta del archivo)' para cada fuente citada.";

/// Shared dependencies for answering a question, held behind `Arc` so `stream_answer` can
/// produce a `'static` stream suitable for an axum response body.
#[derive(Clone)]
pub struct RagChain {
    db: Arc<SurrealDbClient>,
    openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    embedding_provider: Arc<EmbeddingProvider>,
    app_config: AppConfig,
}

impl RagChain {
    pub fn new(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        embedding_provider: Arc<EmbeddingProvider>,
        app_config: AppConfig,
    ) -> Self {
        Self {
            db,
            openai_client,
            embedding_provider,
            app_config,
        }
    }

    /// Streams an answer for `question` within `session_id`, yielding pre-rendered SSE
    /// frame text (`"data: {...}\n\n"`). `expediente_filter` selects the expediente-scoped
    /// mode when present; otherwise the general corpus mode is used.
    pub fn stream_answer(
        &self,
        session_id: String,
        user_id: String,
        question: String,
        expediente_filter: Option<String>,
    ) -> impl Stream<Item = String> + Send + 'static {
        let db = Arc::clone(&self.db);
        let openai_client = Arc::clone(&self.openai_client);
        let embedding_provider = Arc::clone(&self.embedding_provider);
        let app_config = self.app_config.clone();

        async_stream::stream! {
            let (session, history) = match load_or_create_session(&db, &session_id, &user_id, &expediente_filter).await {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "failed to load session");
                    yield SseFrame::Error(err.to_string()).to_sse();
                    yield SseFrame::Done.to_sse();
                    return;
                }
            };

            let context_history: Vec<Message> =
                bounded_history(&history, app_config.chat_history_limit).to_vec();

            let rewritten = rewrite::rewrite_query(&openai_client, &db, &context_history, &question).await;

            let params = match &expediente_filter {
                Some(numero) => RetrieverParams::expediente(&app_config, numero.clone()),
                None => RetrieverParams::general(&app_config),
            };

            let retrieved = match retrieve::retrieve(&params, &rewritten, &embedding_provider, &db).await {
                Ok(hits) => hits,
                Err(err) => {
                    error!(error = %err, "retrieval failed");
                    yield SseFrame::Error(err.to_string()).to_sse();
                    yield SseFrame::Done.to_sse();
                    return;
                }
            };

            let ruta_map = build_ruta_map(&retrieved, &db).await;
            let formatted = formatting::format_chunks(&retrieved, &|doc_id| {
                ruta_map.get(doc_id).cloned().unwrap_or_default()
            });
            let context = formatting::join_context(&formatted);

            if let Err(err) = persist_user_message(&db, &session, &question).await {
                warn!(error = %err, "failed to persist user message; continuing with answer generation");
            }

            let system_prompt = if expediente_filter.is_some() {
                EXPEDIENTE_SYSTEM_PROMPT
            } else {
                GENERAL_SYSTEM_PROMPT
            };

            let settings = match SystemSettings::get_current(&db).await {
                Ok(settings) => settings,
                Err(err) => {
                    error!(error = %err, "failed to load system settings");
                    yield SseFrame::Error(err.to_string()).to_sse();
                    yield SseFrame::Done.to_sse();
                    return;
                }
            };

            let user_message = format!(
                "Historial de la conversacion:\n==================\n{}\n\n\
                 Contexto recuperado:\n==================\n{}\n\n\
                 Pregunta del usuario:\n==================\n{}",
                format_history(&context_history),
                context,
                question,
            );

            let request = CreateChatCompletionRequestArgs::default()
                .model(&settings.query_model)
                .messages([
                    ChatCompletionRequestSystemMessage::from(system_prompt).into(),
                    ChatCompletionRequestUserMessage::from(user_message).into(),
                ])
                .build();

            let request = match request {
                Ok(request) => request,
                Err(err) => {
                    error!(error = %err, "failed to build chat request");
                    yield SseFrame::Error(err.to_string()).to_sse();
                    yield SseFrame::Done.to_sse();
                    return;
                }
            };

            let mut openai_stream = match openai_client.chat().create_stream(request).await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(error = %err, "failed to open OpenAI stream");
                    yield SseFrame::Error(err.to_string()).to_sse();
                    yield SseFrame::Done.to_sse();
                    return;
                }
            };

            let mut filter = ThinkingFilter::new();
            let mut full_answer = String::new();
            let mut fatal_error = false;

            while let Some(item) = openai_stream.next().await {
                match item {
                    Ok(response) => {
                        let content = response
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                            .unwrap_or_default();
                        if content.is_empty() {
                            continue;
                        }
                        let visible = filter.push(&content);
                        if !visible.is_empty() {
                            full_answer.push_str(&visible);
                            yield SseFrame::Chunk(visible).to_sse();
                        }
                    }
                    Err(err) => {
                        error!(error = %err, "OpenAI stream error");
                        yield SseFrame::Error(err.to_string()).to_sse();
                        fatal_error = true;
                        break;
                    }
                }
            }
            filter.finish();

            if !fatal_error && full_answer.trim().is_empty() {
                full_answer = NO_RELEVANT_INFO_MESSAGE.to_string();
                yield SseFrame::Chunk(full_answer.clone()).to_sse();
            }

            if !fatal_error {
                if let Err(err) = persist_ai_message(&db, &session, &full_answer).await {
                    warn!(error = %err, "failed to persist AI message");
                }
            }

            yield SseFrame::Done.to_sse();
        }
    }
}

async fn load_or_create_session(
    db: &SurrealDbClient,
    session_id: &str,
    user_id: &str,
    expediente_filter: &Option<String>,
) -> Result<(Session, Vec<Message>), AppError> {
    match Session::get_complete(session_id, user_id, db).await {
        Ok(pair) => Ok(pair),
        Err(AppError::NotFound(_)) => {
            let session = Session::new(session_id.to_string(), user_id.to_string(), expediente_filter.clone());
            db.store_item(session.clone()).await?;
            Ok((session, Vec::new()))
        }
        Err(err) => Err(err),
    }
}

async fn persist_user_message(db: &SurrealDbClient, session: &Session, question: &str) -> Result<(), AppError> {
    let message = Message::new(session.id.clone(), MessageRole::Human, question.to_string());
    db.store_item(message).await?;

    if let Some(title) = Session::generated_title(&session.title, question) {
        Session::patch_title(&session.id, &session.user_id, &title, db).await?;
    }
    Ok(())
}

async fn persist_ai_message(db: &SurrealDbClient, session: &Session, answer: &str) -> Result<(), AppError> {
    let message = Message::new(session.id.clone(), MessageRole::Ai, answer.to_string());
    db.store_item(message).await?;

    let (_, history) = Session::get_complete(&session.id, &session.user_id, db).await?;
    Session::bump_message_count(&session.id, history.len() as u32, db).await?;
    Ok(())
}

async fn build_ruta_map(
    retrieved: &[common::storage::vector::RetrievedChunk],
    db: &SurrealDbClient,
) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for chunk in retrieved {
        if map.contains_key(&chunk.document_id) {
            continue;
        }
        match db.get_item::<Document>(&chunk.document_id).await {
            Ok(Some(document)) => {
                map.insert(chunk.document_id.clone(), document.ruta);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(document_id = %chunk.document_id, error = %err, "failed to resolve document path for citation");
            }
        }
    }
    map
}
