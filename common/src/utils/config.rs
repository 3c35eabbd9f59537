use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

/// Which backend `EmbeddingProvider` dispatches to. `OpenAi` is the production
/// default; `FastEmbed` runs a local model; `Hashed` is a deterministic, dependency-free
/// stand-in used by tests and the evaluation harness.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    OpenAi,
    FastEmbed,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAi
}

/// Which extraction path a PDF tries first. The OCR/vision fallback in either mode still
/// fires when the fast path's output fails the length/ASCII-ratio heuristics.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PdfIngestMode {
    FastPathFirst,
    LlmFirst,
}

fn default_pdf_ingest_mode() -> PdfIngestMode {
    PdfIngestMode::FastPathFirst
}

/// What happens when an upload targets an `(expediente, filename)` pair that already has a
/// `Procesado` Document, matching the re-upload idempotency rule.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    Skip,
    Version,
}

fn default_duplicate_policy() -> DuplicatePolicy {
    DuplicatePolicy::Skip
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,
    #[serde(default = "default_pdf_ingest_mode")]
    pub pdf_ingest_mode: PdfIngestMode,
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_fastembed_model")]
    pub fastembed_model: Option<String>,

    // --- Chunking / embedding ---
    #[serde(default = "default_chunk_min_tokens")]
    pub chunk_min_tokens: usize,
    #[serde(default = "default_chunk_max_tokens")]
    pub chunk_max_tokens: usize,
    #[serde(default = "default_chunk_overlap_tokens")]
    pub chunk_overlap_tokens: usize,

    // --- OCR fallback ---
    #[serde(default = "default_ocr_min_chars")]
    pub ocr_min_chars: usize,
    #[serde(default = "default_ocr_min_alnum_ratio")]
    pub ocr_min_alnum_ratio: f64,
    #[serde(default = "default_ocr_max_pages")]
    pub ocr_max_pages: usize,
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,

    // --- Audio transcription ---
    #[serde(default = "default_audio_chunk_duration_minutes")]
    pub audio_chunk_duration_minutes: u32,
    #[serde(default = "default_audio_chunk_overlap_seconds")]
    pub audio_chunk_overlap_seconds: u32,
    #[serde(default = "default_audio_chunking_threshold_mb")]
    pub audio_chunking_threshold_mb: u64,
    #[serde(default = "default_audio_max_chunks")]
    pub audio_max_chunks: usize,

    // --- Ingestion orchestration ---
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_duplicate_policy")]
    pub duplicate_policy: DuplicatePolicy,

    // --- Progress tracker ---
    #[serde(default = "default_progress_ttl_seconds")]
    pub progress_ttl_seconds: u64,

    // --- Retriever ---
    #[serde(default = "default_retriever_top_k_general")]
    pub retriever_top_k_general: usize,
    #[serde(default = "default_retriever_top_k_expediente")]
    pub retriever_top_k_expediente: usize,
    #[serde(default = "default_retriever_similarity_threshold_general")]
    pub retriever_similarity_threshold_general: f32,
    #[serde(default = "default_retriever_similarity_threshold_expediente")]
    pub retriever_similarity_threshold_expediente: f32,
    #[serde(default = "default_expedient_documents_cap")]
    pub expedient_documents_cap: usize,

    // --- Session store ---
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chunk_min_tokens() -> usize {
    500
}
fn default_chunk_max_tokens() -> usize {
    2_000
}
fn default_chunk_overlap_tokens() -> usize {
    100
}
fn default_ocr_min_chars() -> usize {
    50
}
fn default_ocr_min_alnum_ratio() -> f64 {
    0.7
}
fn default_ocr_max_pages() -> usize {
    20
}
fn default_ocr_dpi() -> u32 {
    200
}
fn default_audio_chunk_duration_minutes() -> u32 {
    10
}
fn default_audio_chunk_overlap_seconds() -> u32 {
    30
}
fn default_audio_chunking_threshold_mb() -> u64 {
    50
}
fn default_audio_max_chunks() -> usize {
    50
}
fn default_max_upload_bytes() -> u64 {
    1024 * 1024 * 1024
}
fn default_progress_ttl_seconds() -> u64 {
    3600
}
fn default_retriever_top_k_general() -> usize {
    15
}
fn default_retriever_top_k_expediente() -> usize {
    50
}
fn default_retriever_similarity_threshold_general() -> f32 {
    0.3
}
fn default_retriever_similarity_threshold_expediente() -> f32 {
    0.2
}
fn default_expedient_documents_cap() -> usize {
    1024
}
fn default_chat_history_limit() -> usize {
    20
}
fn default_session_ttl_days() -> i64 {
    30
}
fn default_fastembed_model() -> Option<String> {
    None
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: String::new(),
            surrealdb_database: String::new(),
            data_dir: default_data_dir(),
            http_port: 0,
            openai_base_url: default_base_url(),
            storage: default_storage_kind(),
            pdf_ingest_mode: default_pdf_ingest_mode(),
            embedding_backend: default_embedding_backend(),
            fastembed_model: default_fastembed_model(),
            chunk_min_tokens: default_chunk_min_tokens(),
            chunk_max_tokens: default_chunk_max_tokens(),
            chunk_overlap_tokens: default_chunk_overlap_tokens(),
            ocr_min_chars: default_ocr_min_chars(),
            ocr_min_alnum_ratio: default_ocr_min_alnum_ratio(),
            ocr_max_pages: default_ocr_max_pages(),
            ocr_dpi: default_ocr_dpi(),
            audio_chunk_duration_minutes: default_audio_chunk_duration_minutes(),
            audio_chunk_overlap_seconds: default_audio_chunk_overlap_seconds(),
            audio_chunking_threshold_mb: default_audio_chunking_threshold_mb(),
            audio_max_chunks: default_audio_max_chunks(),
            max_upload_bytes: default_max_upload_bytes(),
            duplicate_policy: default_duplicate_policy(),
            progress_ttl_seconds: default_progress_ttl_seconds(),
            retriever_top_k_general: default_retriever_top_k_general(),
            retriever_top_k_expediente: default_retriever_top_k_expediente(),
            retriever_similarity_threshold_general: default_retriever_similarity_threshold_general(),
            retriever_similarity_threshold_expediente:
                default_retriever_similarity_threshold_expediente(),
            expedient_documents_cap: default_expedient_documents_cap(),
            chat_history_limit: default_chat_history_limit(),
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;

    pub fn test_config_memory() -> AppConfig {
        AppConfig {
            openai_api_key: "test".into(),
            surrealdb_address: "test".into(),
            surrealdb_username: "test".into(),
            surrealdb_password: "test".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            data_dir: "/tmp/unused".into(),
            http_port: 0,
            openai_base_url: "..".into(),
            storage: StorageKind::Memory,
            pdf_ingest_mode: PdfIngestMode::FastPathFirst,
            embedding_backend: EmbeddingBackend::Hashed,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.ocr_min_chars, 50);
        assert_eq!(cfg.ocr_max_pages, 20);
        assert_eq!((cfg.ocr_min_alnum_ratio * 10.0).round(), 7.0);
        assert_eq!(cfg.audio_chunk_duration_minutes, 10);
        assert_eq!(cfg.audio_chunk_overlap_seconds, 30);
        assert_eq!(cfg.audio_chunking_threshold_mb, 50);
        assert_eq!(cfg.audio_max_chunks, 50);
        assert_eq!(cfg.max_upload_bytes, 1024 * 1024 * 1024);
        assert_eq!(cfg.chat_history_limit, 20);
        assert_eq!(cfg.session_ttl_days, 30);
        assert_eq!(cfg.retriever_top_k_general, 15);
        assert_eq!(cfg.retriever_top_k_expediente, 50);
    }
}
