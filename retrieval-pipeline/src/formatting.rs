//! Metadata formatting: groups retrieved chunks by expediente and renders each with a
//! citation header so the answer LLM can name its sources. Only `page_content` changes;
//! every other field flows through to the caller unchanged.

use common::storage::vector::RetrievedChunk;

/// A formatted context item, ready to be concatenated into the answer prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedChunk {
    pub expediente_numero: String,
    pub filename: String,
    pub chunk_index: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub ruta_archivo: String,
    pub similarity_score: f32,
    pub page_content: String,
}

/// Groups `chunks` by `expediente_numero` (stable ascending sort), banners each group, and
/// renders a citation header + separator around every chunk's text.
pub fn format_chunks(chunks: &[RetrievedChunk], ruta_by_document: &dyn Fn(&str) -> String) -> Vec<FormattedChunk> {
    let mut ordered: Vec<&RetrievedChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| a.expediente_numero.cmp(&b.expediente_numero));

    let mut out = Vec::with_capacity(ordered.len());
    let mut current_group: Option<&str> = None;
    let mut group_count = 0usize;

    for (i, chunk) in ordered.iter().enumerate() {
        if current_group != Some(chunk.expediente_numero.as_str()) {
            current_group = Some(chunk.expediente_numero.as_str());
            group_count = ordered[i..]
                .iter()
                .take_while(|c| c.expediente_numero == chunk.expediente_numero)
                .count();
        }

        let ruta_archivo = ruta_by_document(&chunk.document_id);
        let banner = banner(&chunk.expediente_numero, group_count);
        let page_content = format!(
            "{banner}\n**Expediente:** {} | **Archivo:** {} | **Chunk:** {} | **Págs:** {}-{}\n**Ruta:** {}\n---\n{}\n---",
            chunk.expediente_numero,
            chunk.filename,
            chunk.chunk_index,
            chunk.page_start,
            chunk.page_end,
            ruta_archivo,
            chunk.text,
        );

        out.push(FormattedChunk {
            expediente_numero: chunk.expediente_numero.clone(),
            filename: chunk.filename.clone(),
            chunk_index: chunk.chunk_index,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            ruta_archivo,
            similarity_score: chunk.score,
            page_content,
        });
    }

    out
}

fn banner(expediente_numero: &str, count: usize) -> String {
    let bar = "=".repeat(80);
    format!("{bar}\nEXPEDIENTE: {expediente_numero} ({count} documentos)\n{bar}")
}

/// Joins `formatted`'s `page_content`s for direct inclusion in an LLM prompt.
pub fn join_context(formatted: &[FormattedChunk]) -> String {
    formatted
        .iter()
        .map(|c| c.page_content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(expediente: &str, filename: &str, index: u32) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("{expediente}-{index}"),
            document_id: format!("doc-{filename}"),
            expediente_numero: expediente.to_string(),
            filename: filename.to_string(),
            chunk_index: index,
            page_start: 1,
            page_end: 2,
            text: format!("texto {index}"),
            score: 0.5,
        }
    }

    #[test]
    fn groups_by_expediente_and_banners_each_group_once_per_chunk() {
        let chunks = vec![
            chunk("22-000001-0166-PE", "a.pdf", 0),
            chunk("21-000001-0166-PE", "b.pdf", 0),
            chunk("21-000001-0166-PE", "b.pdf", 1),
        ];
        let formatted = format_chunks(&chunks, &|_| "uploads/x".to_string());

        assert_eq!(formatted.len(), 3);
        assert_eq!(formatted[0].expediente_numero, "21-000001-0166-PE");
        assert_eq!(formatted[1].expediente_numero, "21-000001-0166-PE");
        assert_eq!(formatted[2].expediente_numero, "22-000001-0166-PE");
        assert!(formatted[0].page_content.contains("EXPEDIENTE: 21-000001-0166-PE (2 documentos)"));
        assert!(formatted[2].page_content.contains("EXPEDIENTE: 22-000001-0166-PE (1 documentos)"));
    }

    #[test]
    fn renders_citation_header_and_separators() {
        let chunks = vec![chunk("21-000001-0166-PE", "acta.pdf", 3)];
        let formatted = format_chunks(&chunks, &|_| "uploads/21-000001-0166-PE/acta.pdf".to_string());

        let expected_header =
            "**Expediente:** 21-000001-0166-PE | **Archivo:** acta.pdf | **Chunk:** 3 | **Págs:** 1-2";
        assert!(formatted[0].page_content.contains(expected_header));
        assert!(formatted[0].page_content.contains("**Ruta:** uploads/21-000001-0166-PE/acta.pdf"));
        assert!(formatted[0].page_content.contains("---\ntexto 3\n---"));
    }

    #[test]
    fn join_context_separates_items_with_blank_line() {
        let chunks = vec![
            chunk("21-000001-0166-PE", "a.pdf", 0),
            chunk("21-000001-0166-PE", "b.pdf", 0),
        ];
        let formatted = format_chunks(&chunks, &|_| String::new());
        let joined = join_context(&formatted);
        assert_eq!(joined.matches("\n\n").count() >= 1, true);
    }
}
