use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Core internal error type. Every fallible operation in the ingestion and retrieval
/// engines returns this; HTTP-facing crates translate it into transport status codes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Transient external error: {0}")]
    Transient(String),
    #[error("Data consistency error: {0}")]
    DataConsistency(String),
    #[error("Job was cancelled: {0}")]
    Cancelled(String),
    #[error("No extractable content")]
    NoExtractableContent,
    #[error("Transcription produced no text")]
    EmptyTranscription,
    #[error("LLM produced no content tokens")]
    LLMEmptyOutput,
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether the enclosing operation may reasonably be retried.
    ///
    /// Mirrors the taxonomy in the component design: validation and ownership
    /// failures are never retryable, external timeouts and database conflicts are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Transient(_)
                | AppError::Database(_)
                | AppError::OpenAI(_)
                | AppError::Reqwest(_)
                | AppError::ObjectStore(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!AppError::Validation("bad input".into()).is_retryable());
        assert!(!AppError::Forbidden("not yours".into()).is_retryable());
        assert!(!AppError::Cancelled("job-1".into()).is_retryable());
    }

    #[test]
    fn transient_and_backend_errors_are_retryable() {
        assert!(AppError::Transient("timeout".into()).is_retryable());
    }
}
