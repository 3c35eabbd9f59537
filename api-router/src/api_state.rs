use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use retrieval_pipeline::RagChain;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    pub embedding_provider: Arc<EmbeddingProvider>,
    pub rag_chain: RagChain,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        embedding_provider: Arc<EmbeddingProvider>,
    ) -> Self {
        let rag_chain = RagChain::new(
            db.clone(),
            openai_client.clone(),
            embedding_provider.clone(),
            config.clone(),
        );

        Self {
            db,
            config,
            storage,
            openai_client,
            embedding_provider,
            rag_chain,
        }
    }
}
