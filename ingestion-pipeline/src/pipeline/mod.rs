mod config;
mod state;

pub use config::{retry_delay, IngestionTuning};

use std::sync::Arc;

use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            chunk::Chunk,
            document::{unique_upload_filename, Document, DocumentState},
            expediente::Expediente,
            ingestion_job::{IngestionJob, TOTAL_STEPS},
        },
        vector,
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider, ingest_limits::is_audio_extension},
};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{chunking::chunk_text, extraction, progress::ProgressTracker};

/// Runs the job body, wrapped in a job-level retry loop around
/// retryable failures (`AppError::is_retryable`). Validation and cancellation are not
/// retried — they fail the job immediately.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
    app_config: AppConfig,
    storage: StorageManager,
    embedding_provider: Arc<EmbeddingProvider>,
    tuning: IngestionTuning,
}

/// One uploaded file bound to a job, handed off by the API layer once upload validation
/// passes.
pub struct IngestRequest {
    pub job_id: String,
    pub expediente_numero: String,
    pub filename: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        app_config: AppConfig,
        storage: StorageManager,
        embedding_provider: Arc<EmbeddingProvider>,
    ) -> Self {
        Self::new_with_tuning(
            db,
            openai_client,
            app_config,
            storage,
            embedding_provider,
            IngestionTuning::default(),
        )
    }

    pub fn new_with_tuning(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        app_config: AppConfig,
        storage: StorageManager,
        embedding_provider: Arc<EmbeddingProvider>,
        tuning: IngestionTuning,
    ) -> Self {
        Self {
            db,
            openai_client,
            app_config,
            storage,
            embedding_provider,
            tuning,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(job_id = %request.job_id, expediente = %request.expediente_numero, filename = %request.filename))]
    pub async fn run_job(&self, request: IngestRequest) -> Result<(), AppError> {
        let tracker = ProgressTracker::new(request.job_id.clone(), &self.db);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.run_job_once(&request, &tracker).await {
                Ok(()) => return Ok(()),
                Err(AppError::Cancelled(id)) => {
                    tracker.cancel().await?;
                    return Err(AppError::Cancelled(id));
                }
                Err(err) if err.is_retryable() && attempt < self.tuning.max_attempts => {
                    let delay = retry_delay(attempt, &self.tuning);
                    warn!(attempt, error = %err, delay_secs = delay.as_secs(), "ingestion job failed; retrying");
                    sleep(delay).await;
                }
                Err(err) => {
                    tracker.fail(&err.to_string()).await?;
                    error!(error = %err, attempts = attempt, "ingestion job failed terminally");
                    return Err(err);
                }
            }
        }
    }

    async fn run_job_once(
        &self,
        request: &IngestRequest,
        tracker: &ProgressTracker<'_>,
    ) -> Result<(), AppError> {
        let machine = state::ready();

        // Step 1: validate / checkpoint.
        tracker.check_cancelled().await?;
        tracker.update(1, 5, "Validando solicitud").await?;
        let machine = machine
            .validate()
            .map_err(|(_, g)| AppError::InternalError(format!("invalid transition: {g:?}")))?;

        // Step 2: get-or-create the owning expediente.
        let expediente = Expediente::get_or_create(&request.expediente_numero, &self.db).await?;
        tracker.update(2, 10, "Expediente localizado").await?;

        // Step 3: idempotency check against the duplicate policy.
        if let Some(existing) =
            Document::find_by_expediente_and_filename(&expediente.id, &request.filename, &self.db)
                .await?
        {
            if matches!(existing.state, DocumentState::Procesado)
                && matches!(
                    self.app_config.duplicate_policy,
                    common::utils::config::DuplicatePolicy::Skip
                )
            {
                info!("document already processed; skipping per duplicate policy");
                tracker.update(TOTAL_STEPS, 100, "Ya procesado").await?;
                tracker.complete().await?;
                return Ok(());
            }
        }

        // Step 4: create the Document row and reserve a collision-free upload path.
        let existing_docs = Document::list_for_expediente(&expediente.id, &self.db).await?;
        let existing_filenames: Vec<String> =
            existing_docs.into_iter().map(|d| d.filename).collect();
        let stored_filename = unique_upload_filename(&existing_filenames, &request.filename);

        let content_type = content_type_for(&request.extension);
        let document = Document::new(
            expediente.id.clone(),
            request.filename.clone(),
            request.extension.clone(),
            content_type.to_string(),
        );
        self.db.store_item(document.clone()).await?;
        let machine = machine
            .extract()
            .map_err(|(_, g)| AppError::InternalError(format!("invalid transition: {g:?}")))?;
        tracker.update(4, 20, "Documento registrado").await?;

        // Step 5: cancellation checkpoint before any external side effect.
        if let Err(err) = tracker.check_cancelled().await {
            self.compensate(&document.id).await;
            return Err(err);
        }

        // Step 6: persist the raw bytes and record their location.
        let ruta = format!("uploads/{}/{}", expediente.numero, stored_filename);
        if let Err(err) = self
            .storage
            .put(&ruta, Bytes::from(request.bytes.clone()))
            .await
        {
            self.compensate(&document.id).await;
            return Err(AppError::from(err));
        }
        Document::set_ruta(&document.id, &ruta, &self.db).await?;
        let machine = machine
            .stage()
            .map_err(|(_, g)| AppError::InternalError(format!("invalid transition: {g:?}")))?;
        tracker.update(6, 30, "Archivo almacenado").await?;

        // Step 7: cancellation checkpoint before extraction.
        if let Err(err) = tracker.check_cancelled().await {
            self.compensate(&document.id).await;
            return Err(err);
        }

        // Step 8a: extract text (dispatches on extension to direct or transcoded extraction).
        let text = match self.extract(request, tracker).await {
            Ok(text) => text,
            Err(err) => {
                self.compensate(&document.id).await;
                return Err(err);
            }
        };
        tracker.update(8, 45, "Texto extraido").await?;

        // Step 8b: chunk and embed.
        let prepared = match chunk_text(&text, &self.app_config) {
            Ok(chunks) => chunks,
            Err(err) => {
                self.compensate(&document.id).await;
                return Err(err);
            }
        };
        let bodies: Vec<String> = prepared.iter().map(|c| c.text.clone()).collect();
        let embeddings = match self.embedding_provider.embed_batch(bodies).await {
            Ok(v) => v,
            Err(err) => {
                self.compensate(&document.id).await;
                return Err(err);
            }
        };
        let chunks: Vec<Chunk> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|(prep, embedding)| {
                Chunk::new(
                    document.id.clone(),
                    expediente.id.clone(),
                    expediente.numero.clone(),
                    stored_filename.clone(),
                    prep,
                    embedding,
                )
            })
            .collect();
        tracker.update(9, 60, "Fragmentos generados").await?;

        // Step 9: cancellation checkpoint before the (irreversible) vector-store write.
        if let Err(err) = tracker.check_cancelled().await {
            self.compensate(&document.id).await;
            return Err(err);
        }

        // Step 10: insert chunks. A failure here is compensated by deleting any partial
        // insert and flipping the document to Error rather than leaving it Pendiente.
        if let Err(err) = vector::insert(chunks, &self.db).await {
            let _ = Chunk::delete_by_document_id(&document.id, &self.db).await;
            self.compensate(&document.id).await;
            return Err(err);
        }
        tracker.update(10, 85, "Fragmentos almacenados").await?;

        // Step 11: mark the document processed.
        if let Err(err) =
            Document::set_state(&document.id, DocumentState::Procesado, &self.db).await
        {
            self.compensate(&document.id).await;
            return Err(err);
        }
        let _machine = machine
            .commit()
            .map_err(|(_, g)| AppError::InternalError(format!("invalid transition: {g:?}")))?;

        // Step 12: mark the job complete.
        tracker.update(TOTAL_STEPS, 100, "Completado").await?;
        tracker.complete().await?;

        Ok(())
    }

    async fn extract(
        &self,
        request: &IngestRequest,
        tracker: &ProgressTracker<'_>,
    ) -> Result<String, AppError> {
        if is_audio_extension(&request.extension) {
            let job_id = tracker.job_id().to_string();
            let db = self.db.clone();
            let on_progress = move |pct: u8| {
                let db = db.clone();
                let job_id = job_id.clone();
                tokio::spawn(async move {
                    let _ =
                        IngestionJob::update_progress(&job_id, 8, pct, "Transcribiendo audio", &db)
                            .await;
                });
            };
            extraction::transcribe(
                &request.bytes,
                &request.extension,
                &self.db,
                &self.openai_client,
                &self.app_config,
                &on_progress,
            )
            .await
        } else {
            extraction::extract_text(
                &request.bytes,
                &request.extension,
                &self.db,
                &self.openai_client,
                &self.app_config,
            )
            .await
        }
    }

    /// Best-effort failure compensation: flips the document to `Error` so it never sits
    /// stuck `Pendiente`. Chunk cleanup for the vector-store failure path happens at the
    /// call site before this runs.
    async fn compensate(&self, document_id: &str) {
        if let Err(err) = Document::set_state(document_id, DocumentState::Error, &self.db).await {
            error!(document_id, error = %err, "failed to mark document as errored during compensation");
        }
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "rtf" => "application/rtf",
        "txt" => "text/plain",
        "html" | "htm" | "xhtml" => "text/html",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::config::testing::test_config_memory;
    use uuid::Uuid;

    async fn test_pipeline() -> (IngestionPipeline, Arc<SurrealDbClient>) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("memory db"),
        );
        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new().with_api_key("unused"),
        ));
        let app_config = test_config_memory();
        let storage = StorageManager::new(&app_config).await.expect("storage");
        let provider = common::utils::embedding::build_provider(&app_config, &openai_client, &db)
            .await
            .expect("provider");
        let pipeline = IngestionPipeline::new(
            db.clone(),
            openai_client,
            app_config,
            storage,
            Arc::new(provider),
        );
        (pipeline, db)
    }

    #[tokio::test]
    async fn run_job_ingests_plain_text_end_to_end() {
        let (pipeline, db) = test_pipeline().await;
        let job =
            IngestionJob::create_and_add_to_db("21-004512-0166-PE".into(), "acta.txt".into(), &db)
                .await
                .expect("create job");

        let request = IngestRequest {
            job_id: job.id.clone(),
            expediente_numero: "21-004512-0166-PE".into(),
            filename: "acta.txt".into(),
            extension: "txt".into(),
            bytes: b"Resolucion judicial de prueba con contenido suficiente.".to_vec(),
        };

        pipeline.run_job(request).await.expect("run job");

        let finished: IngestionJob = db.get_item(&job.id).await.unwrap().unwrap();
        assert_eq!(finished.progress, 100);

        let expediente = Expediente::by_numero("21-004512-0166-PE", &db)
            .await
            .unwrap()
            .unwrap();
        let docs = Document::list_for_expediente(&expediente.id, &db).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].state, DocumentState::Procesado);
    }

    #[tokio::test]
    async fn run_job_marks_document_errored_on_empty_content() {
        let (pipeline, db) = test_pipeline().await;
        let job =
            IngestionJob::create_and_add_to_db("21-004512-0166-PE".into(), "vacio.txt".into(), &db)
                .await
                .expect("create job");

        let request = IngestRequest {
            job_id: job.id.clone(),
            expediente_numero: "21-004512-0166-PE".into(),
            filename: "vacio.txt".into(),
            extension: "txt".into(),
            bytes: Vec::new(),
        };

        let result = pipeline.run_job(request).await;
        assert!(result.is_err());

        let failed: IngestionJob = db.get_item(&job.id).await.unwrap().unwrap();
        assert_eq!(
            failed.state,
            common::storage::types::ingestion_job::JobState::Fallido
        );
    }

    #[tokio::test]
    async fn run_job_respects_cancellation_checkpoint() {
        let (pipeline, db) = test_pipeline().await;
        let job =
            IngestionJob::create_and_add_to_db("21-004512-0166-PE".into(), "acta.txt".into(), &db)
                .await
                .expect("create job");
        IngestionJob::request_cancel(&job.id, &db).await.expect("cancel");

        let request = IngestRequest {
            job_id: job.id.clone(),
            expediente_numero: "21-004512-0166-PE".into(),
            filename: "acta.txt".into(),
            extension: "txt".into(),
            bytes: b"contenido".to_vec(),
        };

        let err = pipeline.run_job(request).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));

        let job: IngestionJob = db.get_item(&job.id).await.unwrap().unwrap();
        assert_eq!(
            job.state,
            common::storage::types::ingestion_job::JobState::Cancelado
        );
    }
}
