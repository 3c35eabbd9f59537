use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::{
    storage::types::{
        audit::{log_audit, AuditActionType, AuditRecord},
        expediente::Expediente,
        ingestion_job::IngestionJob,
    },
    utils::ingest_limits::validate_upload,
};
use ingestion_pipeline::{IngestRequest, IngestionPipeline};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::UserId};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub expediente_numero: String,
    pub file: FieldData<NamedTempFile>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub job_id: String,
    pub expediente: String,
    pub filename: String,
    pub state: &'static str,
}

/// File-upload endpoint: validates the request fail-fast, then hands the bytes off to
/// an independently-retrying background job rather than blocking the HTTP response on the
/// full 12-step pipeline.
pub async fn upload(
    State(state): State<ApiState>,
    Extension(UserId(user_id)): Extension<UserId>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filename = input
        .file
        .metadata
        .file_name
        .clone()
        .unwrap_or_else(|| "upload.bin".to_string());

    let content_type = input.file.metadata.content_type.clone();

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(common::error::AppError::from)?;

    let extension = validate_upload(
        &state.config,
        &filename,
        content_type.as_deref(),
        bytes.len() as u64,
    )
    .map_err(|err| match err {
        common::utils::ingest_limits::IngestValidationError::BadRequest(msg) => {
            ApiError::ValidationError(msg)
        }
        common::utils::ingest_limits::IngestValidationError::PayloadTooLarge(msg) => {
            ApiError::PayloadTooLarge(msg)
        }
    })?;

    let expediente = Expediente::get_or_create(&input.expediente_numero, &state.db).await?;

    let job = IngestionJob::create_and_add_to_db(expediente.numero.clone(), filename.clone(), &state.db)
        .await?;

    let request = IngestRequest {
        job_id: job.id.clone(),
        expediente_numero: expediente.numero.clone(),
        filename: filename.clone(),
        extension,
        bytes,
    };

    let pipeline = Arc::new(IngestionPipeline::new(
        state.db.clone(),
        state.openai_client.clone(),
        state.config.clone(),
        state.storage.clone(),
        state.embedding_provider.clone(),
    ));

    tokio::spawn(async move {
        if let Err(err) = pipeline.run_job(request).await {
            tracing::warn!(error = %err, "ingestion job ended in error");
        }
    });

    log_audit(
        (*state.db).clone(),
        AuditRecord::new(
            Some(user_id),
            AuditActionType::CargaDocumentos,
            format!("upload de '{filename}'"),
            Some(expediente.id.clone()),
            json!({ "job_id": job.id, "expediente": expediente.numero }),
        ),
    );

    info!(job_id = %job.id, expediente = %expediente.numero, "ingestion job queued");

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            job_id: job.id,
            expediente: expediente.numero,
            filename,
            state: "Pendiente",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::db::SurrealDbClient;

    #[tokio::test]
    async fn reupload_to_the_same_expediente_reuses_the_existing_row() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let first = Expediente::get_or_create("24-000123-0001-PE", &db)
            .await
            .expect("first get_or_create");
        let second = Expediente::get_or_create("24-000123-0001-PE", &db)
            .await
            .expect("second get_or_create");

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn queued_job_starts_pendiente_and_carries_the_expediente_numero() {
        let db = SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.apply_migrations().await.expect("migrations");

        let expediente = Expediente::get_or_create("24-000123-0001-PE", &db)
            .await
            .expect("get_or_create");
        let job = IngestionJob::create_and_add_to_db(
            expediente.numero.clone(),
            "demo.pdf".to_string(),
            &db,
        )
        .await
        .expect("create_and_add_to_db");

        assert_eq!(job.expediente_numero, "24-000123-0001-PE");
        assert_eq!(job.state, common::storage::types::ingestion_job::JobState::Pendiente);

        let response = UploadResponse {
            job_id: job.id.clone(),
            expediente: expediente.numero.clone(),
            filename: "demo.pdf".to_string(),
            state: "Pendiente",
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["job_id"], job.id);
        assert_eq!(json["state"], "Pendiente");
    }
}
