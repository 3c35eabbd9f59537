use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

/// Thin wrapper around a `surrealdb::Surreal<Any>` connection, matching the shape of every
/// `StoredObject` implementor's CRUD calls across the core engine.
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

/// Embedding dimension the vector indexes are built for. A mismatch between this constant
/// and an `EmbeddingProvider`'s reported dimension is refused at startup (see
/// `EmbeddingProvider::dimension` and the Open Question in the design notes).
pub const EMBEDDING_DIMENSION: u32 = 1536;

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Builds the vector indexes and secondary indexes the retrieval and ingestion engines
    /// rely on. Schema DDL proper (table/field definitions) is an external collaborator;
    /// SurrealDB tables are schemaless here and accept `StoredObject` content directly.
    pub async fn apply_migrations(&self) -> Result<(), AppError> {
        self.build_indexes().await?;
        Ok(())
    }

    pub async fn build_indexes(&self) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_embedding_chunks ON chunk FIELDS embedding HNSW DIMENSION {EMBEDDING_DIMENSION}"
            ))
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_document ON chunk FIELDS document_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_expediente ON chunk FIELDS expediente_numero")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_document_expediente ON document FIELDS expediente_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_job_status ON ingestion_job FIELDS state")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_job_user ON ingestion_job FIELDS user_id")
            .await?;
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_audit_user ON audit_record FIELDS user_id")
            .await?;

        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query("REBUILD INDEX IF EXISTS idx_embedding_chunks ON chunk")
            .await?;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Stores an object, requires the struct to implement `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
