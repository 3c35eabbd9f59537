//! Builds the in-memory dependency set each scenario runs against: a fresh SurrealDB
//! namespace/database pair, an in-memory object store, and the real OpenAI-backed chat and
//! embedding clients so the scenarios exercise actual model behavior rather than a stub.

use std::sync::Arc;

use anyhow::{Context, Result};
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::AppConfig, embedding::build_provider, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use retrieval_pipeline::RagChain;

pub struct Harness {
    pub db: Arc<SurrealDbClient>,
    pub storage: StorageManager,
    pub config: AppConfig,
    pub openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    pub embedding_provider: Arc<EmbeddingProvider>,
}

impl Harness {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let namespace = "evaluations";
        let database = format!("scenario_{}", uuid::Uuid::new_v4());

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .context("starting in-memory surrealdb")?,
        );
        db.apply_migrations()
            .await
            .context("applying migrations to scenario database")?;

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        let embedding_provider = Arc::new(
            build_provider(&config, &openai_client, &db)
                .await
                .context("building embedding provider")?,
        );

        let storage = StorageManager::new(&config)
            .await
            .context("building in-memory storage manager")?;

        Ok(Self {
            db,
            storage,
            config,
            openai_client,
            embedding_provider,
        })
    }

    pub fn pipeline(&self) -> IngestionPipeline {
        IngestionPipeline::new(
            self.db.clone(),
            self.openai_client.clone(),
            self.config.clone(),
            self.storage.clone(),
            self.embedding_provider.clone(),
        )
    }

    pub fn rag_chain(&self) -> RagChain {
        RagChain::new(
            self.db.clone(),
            self.openai_client.clone(),
            self.embedding_provider.clone(),
            self.config.clone(),
        )
    }
}
