use std::path::Path;

use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::system_settings::SystemSettings},
    utils::config::AppConfig,
};
use tracing::warn;

/// Reports transcription progress as a percentage in `[0, 100]`; the orchestrator maps this
/// onto the job's overall progress band.
pub type ProgressCallback<'a> = &'a (dyn Fn(u8) + Sync);

const ASR_LANGUAGE: &str = "es";
const ASR_TEMPERATURE: f32 = 0.0;

/// Picks Direct or Chunked per the configured size threshold, escalating to Chunked if Direct fails
/// with an out-of-memory-shaped error.
pub async fn transcribe_audio_file(
    file_path: &Path,
    size_bytes: u64,
    db: &SurrealDbClient,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    config: &AppConfig,
    on_progress: ProgressCallback<'_>,
) -> Result<String, AppError> {
    let settings = SystemSettings::get_current(db).await?;
    let model = settings.voice_processing_model;
    let threshold_bytes = config.audio_chunking_threshold_mb * 1024 * 1024;

    if size_bytes <= threshold_bytes {
        match transcribe_direct(file_path, client, &model).await {
            Ok(text) => {
                on_progress(95);
                return Ok(text);
            }
            Err(err) if is_out_of_memory(&err) => {
                warn!(error = %err, "direct transcription ran out of memory; escalating to chunked strategy");
            }
            Err(err) => return Err(err),
        }
    }

    transcribe_chunked(file_path, size_bytes, client, &model, config, on_progress).await
}

async fn transcribe_direct(
    file_path: &Path,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    model: &str,
) -> Result<String, AppError> {
    let request = CreateTranscriptionRequestArgs::default()
        .file(file_path)
        .model(model)
        .language(ASR_LANGUAGE)
        .temperature(ASR_TEMPERATURE)
        .response_format(AudioResponseFormat::Json)
        .build()?;

    let response = client
        .audio()
        .transcribe(request)
        .await
        .map_err(|e| AppError::Processing(format!("Audio transcription failed: {e}")))?;

    let text = response.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::EmptyTranscription);
    }
    Ok(text)
}

fn is_out_of_memory(error: &AppError) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    const OOM_MARKERS: &[&str] = &["memory", "oom", "out of memory", "cuda"];
    OOM_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Splits the source file into byte-proportional windows and transcribes each sequentially.
/// A true codec-aware split (cutting on sample boundaries) would need a decoder for the
/// compressed formats this accepts; lacking one, windows are carved by assuming a roughly
/// constant bitrate across the file, which is accurate enough for the overlap to paper over
/// boundary effects but can clip a window mid-word at segment edges.
async fn transcribe_chunked(
    file_path: &Path,
    size_bytes: u64,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    model: &str,
    config: &AppConfig,
    on_progress: ProgressCallback<'_>,
) -> Result<String, AppError> {
    let bytes = tokio::fs::read(file_path).await?;
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp3")
        .to_string();

    let windows = byte_windows(
        bytes.len() as u64,
        size_bytes,
        config.audio_chunk_duration_minutes,
        config.audio_chunk_overlap_seconds,
    );

    let mut windows = windows;
    if windows.len() > config.audio_max_chunks {
        warn!(
            total = windows.len(),
            cap = config.audio_max_chunks,
            "audio file exceeds the configured chunk cap; truncating"
        );
        windows.truncate(config.audio_max_chunks);
    }

    let total = windows.len().max(1);
    let mut texts = Vec::with_capacity(windows.len());

    for (i, (start, end)) in windows.into_iter().enumerate() {
        let slice = &bytes[start as usize..end as usize];
        let temp_path = std::env::temp_dir().join(format!(
            "expediente-ingest-chunk-{}-{i}.{extension}",
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&temp_path, slice).await?;

        let text = match transcribe_direct(&temp_path, client, model).await {
            Ok(text) => text,
            Err(err) => {
                warn!(chunk = i, error = %err, "chunk transcription failed; contributing empty text");
                String::new()
            }
        };
        let _ = tokio::fs::remove_file(&temp_path).await;

        texts.push(text);

        let percent = 25 + (i as f64 / total as f64 * 70.0).round() as u8;
        on_progress(percent.min(95));
    }

    let joined = texts.join(" ").trim().to_string();
    on_progress(95);

    if joined.is_empty() {
        return Err(AppError::EmptyTranscription);
    }
    Ok(joined)
}

/// Computes `(start, end)` byte ranges approximating `chunk_duration_minutes`-long windows
/// with `overlap_seconds` of overlap, assuming uniform bitrate across `total_bytes`.
fn byte_windows(
    total_bytes: u64,
    file_duration_proxy_bytes: u64,
    chunk_duration_minutes: u32,
    overlap_seconds: u32,
) -> Vec<(u64, u64)> {
    if total_bytes == 0 {
        return Vec::new();
    }

    // Without a decoder, duration isn't known; approximate a "seconds per byte" constant
    // from a conventional voice-recording bitrate (~128kbps) rather than guessing per-file.
    const ASSUMED_BYTES_PER_SECOND: u64 = 16_000;
    let _ = file_duration_proxy_bytes;

    let chunk_bytes = (chunk_duration_minutes as u64 * 60) * ASSUMED_BYTES_PER_SECOND;
    let overlap_bytes = overlap_seconds as u64 * ASSUMED_BYTES_PER_SECOND;
    let stride = chunk_bytes.saturating_sub(overlap_bytes).max(1);

    let mut windows = Vec::new();
    let mut start = 0u64;
    while start < total_bytes {
        let end = (start + chunk_bytes).min(total_bytes);
        windows.push((start, end));
        if end == total_bytes {
            break;
        }
        start += stride;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_windows_covers_whole_file_with_overlap() {
        let windows = byte_windows(1_000_000, 1_000_000, 1, 10);
        assert!(!windows.is_empty());
        assert_eq!(windows.last().unwrap().1, 1_000_000);
        if windows.len() > 1 {
            assert!(windows[1].0 < windows[0].1, "windows should overlap");
        }
    }

    #[test]
    fn byte_windows_on_empty_file_is_empty() {
        assert!(byte_windows(0, 0, 1, 10).is_empty());
    }

    #[test]
    fn is_out_of_memory_matches_common_phrasings() {
        assert!(is_out_of_memory(&AppError::Processing("Out of memory".into())));
        assert!(is_out_of_memory(&AppError::Processing("OOM killed worker".into())));
        assert!(is_out_of_memory(&AppError::Processing("insufficient memory".into())));
        assert!(is_out_of_memory(&AppError::Processing("CUDA error: device-side assert".into())));
        assert!(!is_out_of_memory(&AppError::Processing("rate limited".into())));
    }
}
