use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Runs the post-extraction cleaning pipeline: NFKC normalization, control-character
/// stripping, double-encoding repair, run/blank-line collapsing, punctuation spacing, and
/// OCR-artifact marker removal. Order matters — later steps assume the earlier ones ran.
pub fn clean_extracted_text(raw: &str) -> String {
    let text: String = raw.nfkc().collect();
    let text = strip_control_chars(&text);
    let text = repair_double_encoding(&text);
    let text = collapse_repeated_chars(&text);
    let text = collapse_blank_lines(&text);
    let text = fix_punctuation_spacing(&text);
    let text = strip_ocr_artifacts(&text);
    text.trim().to_string()
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Repairs the common "double UTF-8" mojibake pattern left by tools that decode a UTF-8
/// byte stream as Latin-1 before re-encoding it (e.g. `Ã©` for `é`).
fn repair_double_encoding(text: &str) -> String {
    let map: &[(&str, &str)] = &[
        ("Ã¡", "á"),
        ("Ã©", "é"),
        ("Ã­", "í"),
        ("Ã³", "ó"),
        ("Ãº", "ú"),
        ("Ã±", "ñ"),
        ("Ã\u{81}", "Á"),
        ("Ã‰", "É"),
        ("Ã\u{8d}", "Í"),
        ("Ã“", "Ó"),
        ("Ãš", "Ú"),
        ("Ã‘", "Ñ"),
        ("â€™", "'"),
        ("â€œ", "\""),
        ("â€\u{9d}", "\""),
        ("â€“", "-"),
        ("â€”", "-"),
    ];

    let mut out = text.to_string();
    for (broken, fixed) in map {
        out = out.replace(broken, fixed);
    }
    out
}

/// Collapses runs of 3+ identical non-whitespace characters (`------`, `......`) down to
/// three, a common artifact of table-border/leader-dot OCR noise.
fn collapse_repeated_chars(text: &str) -> String {
    fn pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"(\S)\1{2,}").expect("valid regex"))
    }
    pattern().replace_all(text, "$1$1$1").into_owned()
}

/// Collapses 3+ consecutive newlines to exactly 2, and trims trailing whitespace from each
/// line, removing blank lines that carried only whitespace.
fn collapse_blank_lines(text: &str) -> String {
    fn newline_run() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
    }

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    newline_run().replace_all(&joined, "\n\n").into_owned()
}

/// Normalizes spacing around punctuation (`hola ,mundo` -> `hola, mundo`,
/// `hola  .  mundo` -> `hola. mundo`).
fn fix_punctuation_spacing(text: &str) -> String {
    fn before_punct() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"\s+([,.;:!?])").expect("valid regex"))
    }
    fn after_punct() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| Regex::new(r"([,.;:!?])(?=\S)").expect("valid regex"))
    }

    let text = before_punct().replace_all(text, "$1");
    after_punct()
        .replace_all(&text, |caps: &regex::Captures| format!("{} ", &caps[1]))
        .into_owned()
}

/// Strips marker strings vision-model OCR fallback leaves behind in place of an embedded
/// image or figure (`[image:...]`, `[graphic]`, `[pic]`, `[photo]`, `[figure N]`).
fn strip_ocr_artifacts(text: &str) -> String {
    fn pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(r"(?i)\[image:.*?\]|\[graphic\]|\[pic\]|\[photo\]|\[figure\s*\d*\]")
                .expect("valid regex")
        })
    }
    pattern().replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_repeated_leader_dots() {
        assert_eq!(collapse_repeated_chars("Indice....... 3"), "Indice... 3");
    }

    #[test]
    fn collapses_excess_blank_lines() {
        let input = "parrafo uno\n\n\n\nparrafo dos";
        assert_eq!(collapse_blank_lines(input), "parrafo uno\n\nparrafo dos");
    }

    #[test]
    fn fixes_punctuation_spacing() {
        assert_eq!(fix_punctuation_spacing("hola ,mundo .adios"), "hola, mundo. adios");
    }

    #[test]
    fn strips_ocr_artifact_markers() {
        assert_eq!(
            strip_ocr_artifacts(
                "texto [IMAGE: firma] continua [graphic] y [pic] y [photo] y [figure 3] fin"
            ),
            "texto  continua  y  y  y  fin"
        );
    }

    #[test]
    fn full_pipeline_is_idempotent_on_clean_text() {
        let clean = "Este es un texto limpio.\n\nCon dos parrafos.";
        assert_eq!(clean_extracted_text(clean), clean);
    }

    #[test]
    fn full_pipeline_repairs_mojibake() {
        let dirty = "resoluci\u{00c3}\u{00b3}n judicial";
        assert_eq!(clean_extracted_text(dirty), "resolución judicial");
    }
}
