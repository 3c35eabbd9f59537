use std::sync::OnceLock;

use common::{error::AppError, storage::types::chunk::PreparedChunk, utils::config::AppConfig};
use text_splitter::{ChunkCapacity, ChunkConfig, TextSplitter};
use tokenizers::Tokenizer;

/// Splits extracted text into token-bounded, overlapping chunks. Page numbers are
/// stamped by the caller for PDFs; other formats leave `page_start`/`page_end` at `0`.
pub fn chunk_text(text: &str, config: &AppConfig) -> Result<Vec<PreparedChunk>, AppError> {
    let bodies = prepare_chunks(
        text,
        config.chunk_min_tokens,
        config.chunk_max_tokens,
        config.chunk_overlap_tokens,
    )?;

    Ok(bodies
        .into_iter()
        .enumerate()
        .map(|(index, text)| PreparedChunk {
            chunk_index: index as u32,
            page_start: 0,
            page_end: 0,
            text,
        })
        .collect())
}

fn prepare_chunks(
    text: &str,
    min_tokens: usize,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<String>, AppError> {
    if min_tokens == 0 || min_tokens > max_tokens {
        return Err(AppError::Validation(
            "chunk_min_tokens must be > 0 and <= chunk_max_tokens".into(),
        ));
    }
    if overlap_tokens >= min_tokens {
        return Err(AppError::Validation(
            "chunk_overlap_tokens must be < chunk_min_tokens".into(),
        ));
    }

    let tokenizer = get_tokenizer()?;
    let chunk_capacity = ChunkCapacity::new(min_tokens)
        .with_max(max_tokens)
        .map_err(|e| AppError::InternalError(format!("chunk capacity: {e}")))?;
    let chunk_config = ChunkConfig::new(chunk_capacity)
        .with_overlap(overlap_tokens)
        .map_err(|e| AppError::InternalError(format!("chunk config: {e}")))?
        .with_sizer(tokenizer);
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks: Vec<String> = splitter.chunks(text).map(str::to_owned).collect();
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    Ok(chunks)
}

fn get_tokenizer() -> Result<&'static Tokenizer, AppError> {
    static TOKENIZER: OnceLock<Result<Tokenizer, String>> = OnceLock::new();
    TOKENIZER
        .get_or_init(|| {
            Tokenizer::from_pretrained("bert-base-cased", None).map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| AppError::InternalError(format!("tokenizer init: {e}")))
}
