use super::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Extensions accepted for direct text extraction.
pub const TEXT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "rtf", "txt", "html", "htm", "xhtml"];

/// Extensions delegated to audio transcription.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];

/// MIME types accepted per extension. Several extensions accept more than one MIME value
/// since browsers and recording tools disagree on what to label the same audio container.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/rtf",
    "text/plain",
    "text/html",
    "application/xhtml+xml",
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/ogg",
    "application/ogg",
    "audio/mp4",
    "audio/x-m4a",
];

fn extension_of(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

pub fn is_audio_extension(extension: &str) -> bool {
    AUDIO_EXTENSIONS.contains(&extension.to_lowercase().as_str())
}

pub fn is_allowed_mime_type(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    ALLOWED_MIME_TYPES.contains(&lower.as_str())
}

/// Upload validation rules, checked fail-fast before any side effect. `content_type` is
/// checked only when the client supplied one — multipart clients are not required to set it.
pub fn validate_upload(
    config: &AppConfig,
    filename: &str,
    content_type: Option<&str>,
    size_bytes: u64,
) -> Result<String, IngestValidationError> {
    if filename.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "filename must not be empty".to_string(),
        ));
    }

    let extension = extension_of(filename).ok_or_else(|| {
        IngestValidationError::BadRequest(format!("{filename} has no extension"))
    })?;

    if !TEXT_EXTENSIONS.contains(&extension.as_str()) && !is_audio_extension(&extension) {
        return Err(IngestValidationError::BadRequest(format!(
            "unsupported extension: .{extension}"
        )));
    }

    if let Some(content_type) = content_type {
        if !is_allowed_mime_type(content_type) {
            return Err(IngestValidationError::BadRequest(format!(
                "unsupported content type: {content_type}"
            )));
        }
    }

    if size_bytes == 0 {
        return Err(IngestValidationError::BadRequest(
            "file must not be empty".to_string(),
        ));
    }

    if size_bytes > config.max_upload_bytes {
        return Err(IngestValidationError::PayloadTooLarge(format!(
            "file is too large. Maximum allowed is {} bytes",
            config.max_upload_bytes
        )));
    }

    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::testing::test_config_memory;

    #[test]
    fn validate_upload_rejects_empty_filename() {
        let config = test_config_memory();
        let result = validate_upload(&config, "   ", Some("application/pdf"), 10);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_upload_rejects_unknown_extension() {
        let config = test_config_memory();
        let result = validate_upload(&config, "malware.exe", None, 10);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_upload_rejects_empty_file() {
        let config = test_config_memory();
        let result = validate_upload(&config, "acta.pdf", Some("application/pdf"), 0);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_upload_rejects_oversized_file() {
        let config = AppConfig {
            max_upload_bytes: 100,
            ..test_config_memory()
        };
        let result = validate_upload(&config, "acta.pdf", Some("application/pdf"), 200);
        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_upload_accepts_known_extensions() {
        let config = test_config_memory();
        assert_eq!(
            validate_upload(&config, "acta.PDF", Some("application/pdf"), 10).unwrap(),
            "pdf"
        );
        assert_eq!(
            validate_upload(&config, "nota.m4a", Some("audio/mp4"), 10).unwrap(),
            "m4a"
        );
    }

    #[test]
    fn validate_upload_accepts_missing_content_type() {
        let config = test_config_memory();
        assert_eq!(validate_upload(&config, "acta.pdf", None, 10).unwrap(), "pdf");
    }

    #[test]
    fn validate_upload_rejects_mismatched_content_type() {
        let config = test_config_memory();
        let result = validate_upload(&config, "acta.pdf", Some("application/zip"), 10);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn is_audio_extension_matches_audio_list_case_insensitively() {
        assert!(is_audio_extension("MP3"));
        assert!(!is_audio_extension("pdf"));
    }

    #[test]
    fn is_allowed_mime_type_is_case_insensitive() {
        assert!(is_allowed_mime_type("APPLICATION/PDF"));
        assert!(!is_allowed_mime_type("application/zip"));
    }
}
