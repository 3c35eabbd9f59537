//! The six end-to-end scenarios (S1-S6): scripted acceptance checks run over the in-memory
//! harness in place of a live deployment, each returning an error describing the first
//! assertion that failed.

use anyhow::{ensure, Context, Result};
use common::storage::{
    db::SurrealDbClient,
    types::{
        document::DocumentState,
        expediente::Expediente,
        ingestion_job::{IngestionJob, JobState},
        session::{new_session_id, Session},
    },
    vector,
};
use futures::StreamExt;
use ingestion_pipeline::IngestRequest;
use tracing::info;

use crate::harness::Harness;

const EXPEDIENTE_NUMERO: &str = "24-000123-0001-PE";

pub async fn s1_ingest_pdf(harness: &Harness) -> Result<()> {
    let job = IngestionJob::create_and_add_to_db(
        EXPEDIENTE_NUMERO.to_string(),
        "demo.pdf".to_string(),
        &harness.db,
    )
    .await
    .context("creating job")?;

    let request = IngestRequest {
        job_id: job.id.clone(),
        expediente_numero: EXPEDIENTE_NUMERO.to_string(),
        filename: "demo.pdf".to_string(),
        extension: "pdf".to_string(),
        bytes: sample_pdf_bytes(),
    };

    harness
        .pipeline()
        .run_job(request)
        .await
        .context("running ingestion job")?;

    let job = reload_job(&job.id, &harness.db).await?;
    ensure!(
        job.state == JobState::Completado,
        "expected job Completado, got {:?}",
        job.state
    );

    let expediente = Expediente::by_numero(EXPEDIENTE_NUMERO, &harness.db)
        .await?
        .context("expediente should exist after ingestion")?;
    let documents =
        common::storage::types::document::Document::list_for_expediente(&expediente.id, &harness.db)
            .await?;
    ensure!(
        documents
            .iter()
            .any(|d| d.filename == "demo.pdf" && d.state == DocumentState::Procesado),
        "expected one Procesado Document named demo.pdf"
    );

    let qvec = harness.embedding_provider.embed("demo").await?;
    let hits = vector::search_by_vector(qvec, 3, 0.0, None, &harness.db).await?;
    ensure!(!hits.is_empty(), "expected at least one indexed chunk");

    info!("S1 ingest pdf: ok");
    Ok(())
}

pub async fn s2_ingest_audio_with_chunking(harness: &Harness) -> Result<()> {
    let job = IngestionJob::create_and_add_to_db(
        EXPEDIENTE_NUMERO.to_string(),
        "hearing.mp3".to_string(),
        &harness.db,
    )
    .await
    .context("creating job")?;

    let bytes = vec![0u8; 220 * 1024 * 1024];
    let request = IngestRequest {
        job_id: job.id.clone(),
        expediente_numero: EXPEDIENTE_NUMERO.to_string(),
        filename: "hearing.mp3".to_string(),
        extension: "mp3".to_string(),
        bytes,
    };

    harness
        .pipeline()
        .run_job(request)
        .await
        .context("running audio ingestion job")?;

    let job = reload_job(&job.id, &harness.db).await?;
    ensure!(job.progress == 100, "expected progress 100, got {}", job.progress);
    ensure!(
        job.state == JobState::Completado,
        "expected job Completado, got {:?}",
        job.state
    );

    info!("S2 ingest audio with chunking: ok");
    Ok(())
}

pub async fn s3_cancel_mid_ingestion(harness: &Harness) -> Result<()> {
    let job = IngestionJob::create_and_add_to_db(
        EXPEDIENTE_NUMERO.to_string(),
        "big.pdf".to_string(),
        &harness.db,
    )
    .await
    .context("creating job")?;
    let job_id = job.id.clone();

    let request = IngestRequest {
        job_id: job.id.clone(),
        expediente_numero: EXPEDIENTE_NUMERO.to_string(),
        filename: "big.pdf".to_string(),
        extension: "pdf".to_string(),
        bytes: sample_pdf_bytes(),
    };

    let pipeline = harness.pipeline();
    let db = harness.db.clone();
    let cancel_job_id = job_id.clone();
    let canceller = tokio::spawn(async move {
        loop {
            if let Ok(Some(current)) = db.get_item::<IngestionJob>(&cancel_job_id).await {
                if current.progress >= 25 {
                    let _ = IngestionJob::request_cancel(&cancel_job_id, &db).await;
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    });

    let _ = pipeline.run_job(request).await;
    canceller.await.ok();

    let job = reload_job(&job_id, &harness.db).await?;
    ensure!(
        job.state == JobState::Cancelado,
        "expected job Cancelado, got {:?}",
        job.state
    );

    let expediente = Expediente::by_numero(EXPEDIENTE_NUMERO, &harness.db).await?;
    if let Some(expediente) = expediente {
        let documents = common::storage::types::document::Document::list_for_expediente(
            &expediente.id,
            &harness.db,
        )
        .await?;
        ensure!(
            !documents.iter().any(|d| d.filename == "big.pdf"
                && d.state == DocumentState::Procesado),
            "cancelled job must not leave a Procesado Document"
        );
    }

    info!("S3 cancel mid-ingestion: ok");
    Ok(())
}

pub async fn s4_query_general(harness: &Harness) -> Result<()> {
    s1_ingest_pdf(harness).await.context("seeding corpus for S4")?;

    let session_id = new_session_id("u1", 1_700_000_000_000);
    let frames = harness
        .rag_chain()
        .stream_answer(
            session_id.clone(),
            "u1".to_string(),
            "Aplicacion del articulo 8.4 CPC?".to_string(),
            None,
        )
        .collect::<Vec<_>>()
        .await;

    ensure!(frames.len() >= 2, "expected at least a chunk frame and a done frame");
    ensure!(
        frames.last().map(|f| f.contains("\"done\":true")).unwrap_or(false),
        "expected the stream to end with a done frame"
    );

    let (_session, messages) = Session::get_complete(&session_id, "u1", &harness.db)
        .await
        .context("loading persisted session")?;
    ensure!(
        messages.iter().any(|m| m.content.contains("FUENTES")),
        "expected the persisted answer to include a FUENTES section"
    );

    info!("S4 query general: ok");
    Ok(())
}

pub async fn s5_query_per_expediente(harness: &Harness) -> Result<()> {
    s1_ingest_pdf(harness).await.context("seeding corpus for S5")?;

    let hits = vector::get_expedient_documents(EXPEDIENTE_NUMERO, 50, &harness.db).await?;
    ensure!(
        hits.iter().all(|h| h.expediente_numero == EXPEDIENTE_NUMERO),
        "all context headers must carry the filtered expediente number"
    );

    let session_id = new_session_id("u1", 1_700_000_001_000);
    let frames = harness
        .rag_chain()
        .stream_answer(
            session_id,
            "u1".to_string(),
            "Aplicacion del articulo 8.4 CPC?".to_string(),
            Some(EXPEDIENTE_NUMERO.to_string()),
        )
        .collect::<Vec<_>>()
        .await;
    ensure!(!frames.is_empty(), "expected at least one frame");

    info!("S5 query per expediente: ok");
    Ok(())
}

pub async fn s6_session_ownership(harness: &Harness) -> Result<()> {
    let session_id = new_session_id("u1", 1_700_000_002_000);
    harness
        .db
        .store_item(Session::new(session_id.clone(), "u1".to_string(), None))
        .await
        .context("seeding session")?;

    let forbidden = Session::delete(&session_id, "u2", &harness.db).await;
    ensure!(
        matches!(forbidden, Err(common::error::AppError::Auth(_))),
        "expected u2's delete to be refused as an ownership mismatch"
    );

    Session::delete(&session_id, "u1", &harness.db)
        .await
        .context("owner's delete should succeed")?;

    let after_delete = Session::get_complete(&session_id, "u1", &harness.db).await;
    ensure!(
        matches!(after_delete, Err(common::error::AppError::NotFound(_))),
        "expected a subsequent get to report NotFound"
    );

    info!("S6 session ownership: ok");
    Ok(())
}

async fn reload_job(job_id: &str, db: &SurrealDbClient) -> Result<IngestionJob> {
    db.get_item::<IngestionJob>(job_id)
        .await?
        .context("job disappeared")
}

fn sample_pdf_bytes() -> Vec<u8> {
    include_bytes!("../fixtures/demo.pdf").to_vec()
}
