use serde::Deserialize;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, types::StoredObject, types::chunk::Chunk},
    utils::embedding::EmbeddingProvider,
};

/// One scored hit from `search_by_vector`/`search_by_text`/`get_expedient_documents`. Same
/// shape regardless of which path produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: String,
    pub document_id: String,
    pub expediente_numero: String,
    pub filename: String,
    pub chunk_index: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
    /// Cosine similarity in `[0, 1]`; `1.0` for `get_expedient_documents` rows, which skip
    /// scoring entirely.
    pub score: f32,
}

impl From<(Chunk, f32)> for RetrievedChunk {
    fn from((chunk, score): (Chunk, f32)) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            expediente_numero: chunk.expediente_numero,
            filename: chunk.filename,
            chunk_index: chunk.chunk_index,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            text: chunk.text,
            score,
        }
    }
}

/// Atomically stores a document's full chunk set. A crash mid-transaction leaves a partial
/// insert; the orchestrator is responsible for noticing and marking the Document `Error`.
pub async fn insert(chunks: Vec<Chunk>, db: &SurrealDbClient) -> Result<(), AppError> {
    if chunks.is_empty() {
        return Ok(());
    }

    let mut query = db.client.query("BEGIN TRANSACTION;");
    for (i, chunk) in chunks.iter().enumerate() {
        query = query
            .query(format!(
                "CREATE type::thing('{table}', $id_{i}) CONTENT $chunk_{i};",
                table = Chunk::table_name(),
            ))
            .bind((format!("id_{i}"), chunk.id.clone()))
            .bind((format!("chunk_{i}"), chunk.clone()));
    }
    query = query.query("COMMIT TRANSACTION;");

    query.await?.check().map_err(AppError::Database)?;
    Ok(())
}

/// `score ∈ [0, 1]`, thresholding is left-inclusive. `filter` narrows to a single
/// expediente without bypassing similarity scoring — for the filter-only expediente view use
/// `get_expedient_documents`.
pub async fn search_by_vector(
    qvec: Vec<f32>,
    top_k: usize,
    score_threshold: f32,
    filter: Option<&str>,
    db: &SurrealDbClient,
) -> Result<Vec<RetrievedChunk>, AppError> {
    #[derive(Deserialize)]
    struct Row {
        #[serde(flatten)]
        chunk: Chunk,
        score: f32,
    }

    let ef = (top_k * 4).max(50);
    let sql = if filter.is_some() {
        format!(
            "SELECT *, vector::similarity::cosine(embedding, $qvec) AS score FROM chunk \
             WHERE embedding <|{top_k},{ef}|> $qvec AND expediente_numero = $filter \
             AND vector::similarity::cosine(embedding, $qvec) >= $threshold \
             ORDER BY score DESC LIMIT {top_k}"
        )
    } else {
        format!(
            "SELECT *, vector::similarity::cosine(embedding, $qvec) AS score FROM chunk \
             WHERE embedding <|{top_k},{ef}|> $qvec \
             AND vector::similarity::cosine(embedding, $qvec) >= $threshold \
             ORDER BY score DESC LIMIT {top_k}"
        )
    };

    let response = db
        .client
        .query(sql)
        .bind(("qvec", qvec))
        .bind(("threshold", score_threshold))
        .bind(("filter", filter.map(str::to_string)))
        .await?;
    let mut response = response.check().map_err(AppError::Database)?;
    let rows: Vec<Row> = response.take(0)?;

    Ok(rows
        .into_iter()
        .map(|row| RetrievedChunk::from((row.chunk, row.score)))
        .collect())
}

/// Embeds `q` with `provider`, then delegates to `search_by_vector`.
pub async fn search_by_text(
    q: &str,
    top_k: usize,
    score_threshold: f32,
    filter: Option<&str>,
    provider: &EmbeddingProvider,
    db: &SurrealDbClient,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let qvec = provider.embed(q).await?;
    search_by_vector(qvec, top_k, score_threshold, filter, db).await
}

/// All chunks for an expediente up to `cap`, unfiltered by similarity (explicit
/// no-thresholding rule for this path). Each row reports `score = 1.0`. Kept as a free
/// function (not a method on `Chunk`) since this belongs to the vector-store adapter
/// boundary, not the persisted record itself.
pub async fn get_expedient_documents(
    expediente_numero: &str,
    cap: usize,
    db: &SurrealDbClient,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let limit = i64::try_from(cap).unwrap_or(i64::MAX);
    let response = db
        .client
        .query(
            "SELECT * FROM chunk WHERE expediente_numero = $numero \
             ORDER BY chunk_index ASC LIMIT $limit",
        )
        .bind(("numero", expediente_numero.to_string()))
        .bind(("limit", limit))
        .await?;
    let mut response = response.check().map_err(AppError::Database)?;
    let rows: Vec<Chunk> = response.take(0)?;

    Ok(rows
        .into_iter()
        .map(|chunk| RetrievedChunk::from((chunk, 1.0)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::chunk::PreparedChunk;
    use uuid::Uuid;

    fn chunk(expediente: &str, index: u32, embedding: Vec<f32>) -> Chunk {
        Chunk::new(
            format!("doc-{index}"),
            format!("exp-{expediente}"),
            expediente.to_string(),
            "acta.pdf".to_string(),
            PreparedChunk {
                chunk_index: index,
                page_start: 1,
                page_end: 1,
                text: format!("chunk body {index}"),
            },
            embedding,
        )
    }

    #[tokio::test]
    async fn search_by_vector_orders_by_similarity_and_respects_threshold() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.client
            .query("DEFINE INDEX idx_embedding_chunks ON chunk FIELDS embedding HNSW DIMENSION 3")
            .await
            .expect("define index");

        insert(
            vec![
                chunk("21-004512-0166-PE", 0, vec![1.0, 0.0, 0.0]),
                chunk("21-004512-0166-PE", 1, vec![0.0, 1.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = search_by_vector(vec![1.0, 0.0, 0.0], 5, 0.0, None, &db)
            .await
            .expect("search");

        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn get_expedient_documents_from_ignores_score_and_returns_all() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");

        insert(
            vec![
                chunk("21-004512-0166-PE", 0, vec![0.1, 0.2, 0.3]),
                chunk("21-004512-0166-PE", 1, vec![0.9, 0.8, 0.7]),
                chunk("21-999999-0166-PE", 0, vec![0.5, 0.5, 0.5]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = get_expedient_documents("21-004512-0166-PE", 1024, &db)
            .await
            .expect("query");

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 1.0));
    }
}
