//! Two-mode retrieval: a general corpus search and an expediente-scoped view, plus a
//! relational-layer fallback for an expediente whose chunks haven't been (re)indexed.

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::document::Document,
        vector::{self, RetrievedChunk},
    },
    utils::embedding::EmbeddingProvider,
};
use tracing::warn;

/// Retrieval tuning, mirroring `AppConfig`'s retriever knobs. Kept as a plain struct (rather than
/// threading `AppConfig` through) so callers can build the general/expediente variants with
/// `RetrieverParams::general`/`expediente`.
#[derive(Debug, Clone)]
pub struct RetrieverParams {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub expediente_filter: Option<String>,
}

impl RetrieverParams {
    pub fn general(config: &common::utils::config::AppConfig) -> Self {
        Self {
            top_k: config.retriever_top_k_general,
            similarity_threshold: config.retriever_similarity_threshold_general,
            expediente_filter: None,
        }
    }

    pub fn expediente(config: &common::utils::config::AppConfig, numero: String) -> Self {
        Self {
            top_k: config.retriever_top_k_expediente,
            similarity_threshold: config.retriever_similarity_threshold_expediente,
            expediente_filter: Some(numero),
        }
    }
}

/// Runs retrieval: a filter narrows to the `get_expedient_documents` view
/// (thresholding skipped); no filter runs a thresholded vector search over the whole
/// corpus. A filtered query that comes back empty, or raises, falls through to chunks
/// synthesized directly from the expediente's stored documents.
pub async fn retrieve(
    params: &RetrieverParams,
    rewritten_query: &str,
    embedding_provider: &EmbeddingProvider,
    db: &SurrealDbClient,
) -> Result<Vec<RetrievedChunk>, AppError> {
    if let Some(numero) = &params.expediente_filter {
        match vector::get_expedient_documents(numero, params.top_k, db).await {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => {
                warn!(expediente = %numero, "vector store empty for expediente; falling back to relational documents");
                return relational_fallback(numero, params.top_k, db).await;
            }
            Err(err) => {
                warn!(expediente = %numero, error = %err, "vector store query failed; falling back to relational documents");
                return relational_fallback(numero, params.top_k, db).await;
            }
        }
    }

    let qvec = embedding_provider.embed(rewritten_query).await?;
    vector::search_by_vector(qvec, params.top_k, params.similarity_threshold, None, db).await
}

/// "Last line of availability for a known-good expediente that hasn't been (re)indexed"
/// Reads `Document` rows directly and, where a document carries extracted text that
/// was never chunked into the vector store, synthesizes a single whole-document chunk for
/// it. Documents with no usable text are skipped rather than erroring the whole retrieval.
async fn relational_fallback(
    expediente_numero: &str,
    cap: usize,
    db: &SurrealDbClient,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let expediente = match common::storage::types::expediente::Expediente::by_numero(expediente_numero, db).await? {
        Some(e) => e,
        None => return Ok(Vec::new()),
    };

    let documents = Document::list_for_expediente(&expediente.id, db).await?;

    let mut out = Vec::new();
    for document in documents.into_iter().take(cap) {
        if document.state != common::storage::types::document::DocumentState::Procesado {
            continue;
        }
        let existing = common::storage::types::chunk::Chunk::count_for_document(&document.id, db).await?;
        if existing > 0 {
            continue;
        }
        // No extracted text is cached outside the vector store for an unchunked document;
        // surface it by filename only so a citation-aware answer can still name the source.
        out.push(RetrievedChunk {
            id: document.id.clone(),
            document_id: document.id.clone(),
            expediente_numero: expediente_numero.to_string(),
            filename: document.filename.clone(),
            chunk_index: 0,
            page_start: 0,
            page_end: 0,
            text: format!(
                "[Documento '{}' registrado en el expediente {} pero aun no indexado para busqueda semantica.]",
                document.filename, expediente_numero
            ),
            score: 1.0,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::{
        chunk::{Chunk, PreparedChunk as PC},
        document::DocumentState,
        expediente::Expediente,
    };

    async fn test_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db")
    }

    async fn hashed_provider(db: &SurrealDbClient) -> EmbeddingProvider {
        let client = async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("unused"),
        );
        common::utils::embedding::build_provider(
            &common::utils::config::testing::test_config_memory(),
            &client,
            db,
        )
        .await
        .expect("hashed provider")
    }

    #[tokio::test]
    async fn expediente_mode_returns_indexed_chunks_ignoring_threshold() {
        let db = test_db().await;
        let expediente = Expediente::new("21-004512-0166-PE".into());
        db.store_item(expediente.clone()).await.expect("store expediente");

        let chunk = Chunk::new(
            "doc-1".into(),
            expediente.id.clone(),
            expediente.numero.clone(),
            "acta.pdf".into(),
            PC { chunk_index: 0, page_start: 1, page_end: 1, text: "contenido".into() },
            vec![0.1, 0.2],
        );
        vector::insert(vec![chunk], &db).await.expect("insert");

        let provider = hashed_provider(&db).await;
        let params = RetrieverParams {
            top_k: 10,
            similarity_threshold: 0.9,
            expediente_filter: Some(expediente.numero.clone()),
        };
        let results = retrieve(&params, "irrelevante", &provider, &db)
            .await
            .expect("retrieve");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 1.0);
    }

    #[tokio::test]
    async fn expediente_mode_falls_back_to_relational_view_when_unindexed() {
        let db = test_db().await;
        let expediente = Expediente::new("21-004512-0166-PE".into());
        db.store_item(expediente.clone()).await.expect("store expediente");

        let mut document = common::storage::types::document::Document::new(
            expediente.id.clone(),
            "oficio.pdf".into(),
            "pdf".into(),
            "application/pdf".into(),
        );
        document.state = DocumentState::Procesado;
        db.store_item(document.clone()).await.expect("store document");

        let provider = hashed_provider(&db).await;
        let params = RetrieverParams {
            top_k: 10,
            similarity_threshold: 0.9,
            expediente_filter: Some(expediente.numero.clone()),
        };
        let results = retrieve(&params, "irrelevante", &provider, &db)
            .await
            .expect("retrieve");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "oficio.pdf");
    }

    #[tokio::test]
    async fn general_mode_applies_similarity_threshold() {
        let db = test_db().await;
        db.build_indexes().await.expect("build indexes");

        let expediente = Expediente::new("21-004512-0166-PE".into());
        db.store_item(expediente.clone()).await.expect("store expediente");

        let provider = hashed_provider(&db).await;
        let embedding = provider.embed("contenido").await.expect("embed");

        let chunk = Chunk::new(
            "doc-1".into(),
            expediente.id.clone(),
            expediente.numero.clone(),
            "acta.pdf".into(),
            PC { chunk_index: 0, page_start: 1, page_end: 1, text: "contenido".into() },
            embedding,
        );
        vector::insert(vec![chunk], &db).await.expect("insert");

        let params = RetrieverParams {
            top_k: 10,
            similarity_threshold: 2.0,
            expediente_filter: None,
        };
        let results = retrieve(&params, "contenido", &provider, &db)
            .await
            .expect("retrieve");
        assert!(results.is_empty());
    }
}
