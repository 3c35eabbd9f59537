use std::{io::Read as _, path::Path};

use common::{error::AppError, storage::db::SurrealDbClient, utils::config::AppConfig};
use dom_smoothie::{Article, Readability, TextMode};
use regex::Regex;
use std::sync::OnceLock;

use crate::{
    text_cleaning::clean_extracted_text,
    utils::{audio_transcription::ProgressCallback, pdf_ingestion::extract_pdf_content},
};

struct TempPathGuard {
    path: std::path::PathBuf,
}

impl TempPathGuard {
    fn as_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempPathGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn materialize_temp_file(bytes: &[u8], extension: &str) -> Result<TempPathGuard, AppError> {
    let mut path = std::env::temp_dir();
    path.push(format!("expediente-ingest-{}.{}", uuid::Uuid::new_v4(), extension));
    tokio::fs::write(&path, bytes).await?;
    Ok(TempPathGuard { path })
}

/// Extracts plain text from an uploaded document's raw bytes, dispatching on file extension.
/// Audio extensions are handled by `on_audio_progress`-driven transcription, not
/// here — the orchestrator routes `.mp3/.wav/.ogg/.m4a` to `transcribe` directly.
pub async fn extract_text(
    bytes: &[u8],
    extension: &str,
    db: &SurrealDbClient,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    config: &AppConfig,
) -> Result<String, AppError> {
    let raw = match extension {
        "txt" => decode_text(bytes),
        "html" | "htm" | "xhtml" => extract_html(bytes)?,
        "pdf" => {
            let guard = materialize_temp_file(bytes, "pdf").await?;
            extract_pdf_content(guard.as_path(), db, client, &config.pdf_ingest_mode, config).await?
        }
        "docx" | "doc" => extract_office(bytes, extension)?,
        "rtf" => extract_rtf(bytes),
        other => {
            return Err(AppError::Validation(format!(
                "unsupported text extension: .{other}"
            )))
        }
    };

    let cleaned = clean_extracted_text(&raw);
    if cleaned.is_empty() {
        return Err(AppError::NoExtractableContent);
    }
    Ok(cleaned)
}

/// `transcribe` dispatches to the Direct/Chunked strategy selection, reported separately so
/// the orchestrator can drive the 25..95 progress band while this runs.
pub async fn transcribe(
    bytes: &[u8],
    extension: &str,
    db: &SurrealDbClient,
    client: &async_openai::Client<async_openai::config::OpenAIConfig>,
    config: &AppConfig,
    on_progress: ProgressCallback<'_>,
) -> Result<String, AppError> {
    let guard = materialize_temp_file(bytes, extension).await?;
    let raw = crate::utils::audio_transcription::transcribe_audio_file(
        guard.as_path(),
        bytes.len() as u64,
        db,
        client,
        config,
        on_progress,
    )
    .await?;
    let cleaned = clean_extracted_text(&raw);
    if cleaned.is_empty() {
        return Err(AppError::EmptyTranscription);
    }
    Ok(cleaned)
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn extract_html(bytes: &[u8]) -> Result<String, AppError> {
    let html = decode_text(bytes);
    let config = dom_smoothie::Config {
        text_mode: TextMode::Formatted,
        ..Default::default()
    };
    let mut readability = Readability::new(html, None, Some(config))
        .map_err(|e| AppError::Processing(format!("html readability init: {e}")))?;
    let article: Article = readability
        .parse()
        .map_err(|e| AppError::Processing(format!("html readability parse: {e}")))?;
    Ok(article.text_content.to_string())
}

/// `.docx` is a ZIP archive of XML parts; this pulls the raw runs out of
/// `word/document.xml` with a tag-stripping pass rather than a full OOXML parser. `.doc`
/// (legacy OLE2 binary) has no equivalent structure available, so it falls back to scanning
/// for printable-ASCII runs, which recovers body text reasonably well but drops all
/// structure and any text stored as non-Latin-1 bytes.
fn extract_office(bytes: &[u8], extension: &str) -> Result<String, AppError> {
    if extension == "doc" {
        return Ok(extract_printable_runs(bytes));
    }

    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| AppError::Processing(format!("docx is not a valid zip: {e}")))?;
    let mut document_xml = String::new();
    {
        let mut entry = archive
            .by_name("word/document.xml")
            .map_err(|e| AppError::Processing(format!("docx missing document.xml: {e}")))?;
        entry.read_to_string(&mut document_xml)?;
    }

    Ok(strip_xml_tags(&document_xml))
}

fn extract_printable_runs(bytes: &[u8]) -> String {
    let mut out = String::new();
    let mut run = String::new();
    for &b in bytes {
        if (0x20..0x7f).contains(&b) || b == b'\n' {
            run.push(b as char);
        } else if !run.is_empty() {
            if run.trim().len() >= 3 {
                out.push_str(run.trim());
                out.push('\n');
            }
            run.clear();
        }
    }
    if run.trim().len() >= 3 {
        out.push_str(run.trim());
    }
    out
}

fn strip_xml_tags(xml: &str) -> String {
    fn paragraph_break() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"</w:p>").expect("valid regex"))
    }
    fn tag() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
    }

    let with_breaks = paragraph_break().replace_all(xml, "</w:p>\n");
    tag().replace_all(&with_breaks, "").into_owned()
}

/// Naive RTF de-escaper: drops control words/groups and keeps literal text. RTF is a
/// plain-text wire format, so this covers the common case without pulling in a dedicated
/// parser — it will mangle documents that lean on RTF's embedded-object features.
fn extract_rtf(bytes: &[u8]) -> String {
    let text = decode_text(bytes);
    fn control_word() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"\\[a-zA-Z]+-?\d*[ ]?|\\'[0-9a-fA-F]{2}|[{}]|\\[^a-zA-Z]").expect("valid regex"))
    }
    control_word().replace_all(&text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_text_falls_back_to_lossy_on_bad_utf8() {
        let bytes = vec![0xff, 0xfe, b'h', b'i'];
        assert!(decode_text(&bytes).ends_with("hi"));
    }

    #[test]
    fn strip_xml_tags_inserts_paragraph_breaks() {
        let xml = "<w:p><w:r><w:t>Hola</w:t></w:r></w:p><w:p><w:r><w:t>Mundo</w:t></w:r></w:p>";
        let text = strip_xml_tags(xml);
        assert_eq!(text, "Hola\nMundo");
    }

    #[test]
    fn extract_rtf_strips_control_words() {
        let rtf = r"{\rtf1\ansi\deff0 {\fonttbl{\f0 Arial;}}\f0\fs24 Hola mundo}";
        let text = extract_rtf(rtf.as_bytes());
        assert!(text.contains("Hola mundo"));
        assert!(!text.contains("\\fonttbl"));
    }

    #[test]
    fn extract_printable_runs_drops_short_binary_fragments() {
        let mut bytes = vec![0u8, 1, 2, 3];
        bytes.extend_from_slice(b"Resolucion judicial");
        bytes.extend_from_slice(&[0, 0, 0]);
        let text = extract_printable_runs(&bytes);
        assert_eq!(text.trim(), "Resolucion judicial");
    }
}
