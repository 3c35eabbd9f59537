use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
};

use async_openai::types::CreateEmbeddingRequestArgs;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::system_settings::SystemSettings},
    utils::config::{AppConfig, EmbeddingBackend},
};

/// Maps text to fixed-dimension vectors. Deterministic for a given model version;
/// batch embedding is the throughput path chunking uses.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAi {
        client: async_openai::Client<async_openai::config::OpenAIConfig>,
        model: String,
        dimension: u32,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        model_name: EmbeddingModel,
        dimension: usize,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::OpenAi { .. } => "openai",
            EmbeddingInner::FastEmbed { .. } => "fastembed",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAi { dimension, .. } => *dimension as usize,
            EmbeddingInner::FastEmbed { dimension, .. } => *dimension,
            EmbeddingInner::Hashed { dimension } => *dimension,
        }
    }

    pub fn model_code(&self) -> Option<String> {
        match &self.inner {
            EmbeddingInner::OpenAi { model, .. } => Some(model.clone()),
            EmbeddingInner::FastEmbed { model_name, .. } => Some(model_name.to_string()),
            EmbeddingInner::Hashed { .. } => None,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        match &self.inner {
            EmbeddingInner::OpenAi {
                client,
                model,
                dimension,
            } => generate_embedding_with_params(client, text, model, *dimension).await,
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                let mut embeddings = guard
                    .embed(vec![text.to_owned()], None)
                    .map_err(|e| AppError::InternalError(format!("fastembed: {e}")))?;
                embeddings
                    .pop()
                    .ok_or_else(|| AppError::LLMParsing("fastembed returned no vector".into()))
            }
        }
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match &self.inner {
            EmbeddingInner::OpenAi { .. } => {
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed(&text).await?);
                }
                Ok(out)
            }
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                guard
                    .embed(texts, None)
                    .map_err(|e| AppError::InternalError(format!("fastembed batch: {e}")))
            }
        }
    }
}

/// Builds the configured provider, consulting `SystemSettings` for the OpenAI model/dimension.
pub async fn build_provider(
    config: &AppConfig,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    db: &SurrealDbClient,
) -> Result<EmbeddingProvider, AppError> {
    match config.embedding_backend {
        EmbeddingBackend::OpenAi => {
            let settings = SystemSettings::get_current(db).await?;
            Ok(EmbeddingProvider {
                inner: EmbeddingInner::OpenAi {
                    client: client.clone(),
                    model: settings.embedding_model,
                    dimension: settings.embedding_dimensions,
                },
            })
        }
        EmbeddingBackend::Hashed => Ok(EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: crate::storage::db::EMBEDDING_DIMENSION as usize,
            },
        }),
        EmbeddingBackend::FastEmbed => {
            let model_name = if let Some(code) = config.fastembed_model.as_deref() {
                EmbeddingModel::from_str(code)
                    .map_err(|e| AppError::Validation(format!("unknown fastembed model: {e}")))?
            } else {
                EmbeddingModel::default()
            };

            let options =
                TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
            let model_name_for_task = model_name.clone();

            let (model, dimension) = tokio::task::spawn_blocking(move || {
                let model = TextEmbedding::try_new(options)
                    .map_err(|e| AppError::InternalError(format!("fastembed init: {e}")))?;
                let info = EmbeddingModel::get_model_info(&model_name_for_task).ok_or_else(|| {
                    AppError::InternalError("fastembed model metadata missing".to_string())
                })?;
                Ok::<_, AppError>((model, info.dim))
            })
            .await??;

            Ok(EmbeddingProvider {
                inner: EmbeddingInner::FastEmbed {
                    model: Arc::new(Mutex::new(model)),
                    model_name,
                    dimension,
                },
            })
        }
    }
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

/// Generates an embedding vector for the given input text using the configured OpenAI model.
pub async fn generate_embedding(
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    input: &str,
    db: &SurrealDbClient,
) -> Result<Vec<f32>, AppError> {
    let model = SystemSettings::get_current(db).await?;

    generate_embedding_with_params(client, input, &model.embedding_model, model.embedding_dimensions).await
}

/// Generates an embedding vector using a specific model and dimension, bypassing
/// `SystemSettings` for callers (e.g. re-embedding) that already know both.
pub async fn generate_embedding_with_params(
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    input: &str,
    model: &str,
    dimensions: u32,
) -> Result<Vec<f32>, AppError> {
    let request = CreateEmbeddingRequestArgs::default()
        .model(model)
        .input([input])
        .dimensions(dimensions)
        .build()?;

    let response = client.embeddings().create(request).await?;

    let embedding = response
        .data
        .first()
        .ok_or_else(|| AppError::LLMParsing("No embedding data received from API".into()))?
        .embedding
        .clone();

    debug!("Embedding was created with {:?} dimensions", embedding.len());

    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::testing::test_config_memory;

    #[tokio::test]
    async fn hashed_provider_is_deterministic() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("unused"),
        );
        let config = test_config_memory();

        let provider = build_provider(&config, &client, &db).await.expect("provider");
        assert_eq!(provider.backend_label(), "hashed");

        let a = provider.embed("hola mundo").await.expect("embed a");
        let b = provider.embed("hola mundo").await.expect("embed b");
        assert_eq!(a, b);
        assert_eq!(a.len(), provider.dimension());
    }

    #[tokio::test]
    async fn hashed_provider_embed_batch_matches_individual_embed() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("unused"),
        );
        let provider = build_provider(&test_config_memory(), &client, &db)
            .await
            .expect("provider");

        let single = provider.embed("expediente penal").await.expect("embed");
        let batch = provider
            .embed_batch(vec!["expediente penal".to_string()])
            .await
            .expect("embed batch");

        assert_eq!(batch, vec![single]);
    }
}
