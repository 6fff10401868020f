//! Text normalization shared by documents and queries.
//!
//! Documents and queries must go through the same function, otherwise their
//! embeddings are not comparable.

use ragline_core::types::Document;

/// Collapse every whitespace run (newlines included) to one space and trim.
///
/// Whitespace-only input yields an empty string.
pub fn normalize(raw_text: &str) -> String {
    raw_text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a fetched document, returning `None` when nothing is left.
///
/// Empty documents are dropped here, before embedding, so the document list
/// and the index built from it stay position-aligned.
pub fn normalize_document(source_id: &str, raw_text: String) -> Option<Document> {
    let normalized_text = normalize(&raw_text);
    if normalized_text.is_empty() {
        return None;
    }
    Some(Document {
        source_id: source_id.to_string(),
        raw_text,
        normalized_text,
    })
}
