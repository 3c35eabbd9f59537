use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Chunk, "chunk", {
    document_id: String,
    expediente_id: String,
    expediente_numero: String,
    filename: String,
    chunk_index: u32,
    page_start: u32,
    page_end: u32,
    text: String,
    embedding: Vec<f32>
});

/// One chunk awaiting embedding + persistence, produced during chunking and consumed by the
/// embedding/persistence step.
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub chunk_index: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document_id: String,
        expediente_id: String,
        expediente_numero: String,
        filename: String,
        prepared: PreparedChunk,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            expediente_id,
            expediente_numero,
            filename,
            chunk_index: prepared.chunk_index,
            page_start: prepared.page_start,
            page_end: prepared.page_end,
            text: prepared.text,
            embedding,
        }
    }

    pub async fn delete_by_document_id(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .check()
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn count_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.len())
    }
}
