//! Extractive response composer.
//!
//! No synthesis happens here: the response is the retrieved text itself,
//! trimmed to a length a chat client can display.

use ragline_core::types::RetrievalResult;

/// Returned when a retrieval found nothing to quote.
pub const NO_RESULTS_MESSAGE: &str = "I couldn't find any relevant documents for that question.";

/// Render retrieved documents as a chat response.
///
/// The documents' normalized texts are joined with spaces and cut to at most
/// `max_chars` characters.
pub fn compose_response(result: &RetrievalResult, max_chars: usize) -> String {
    if result.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    let context = result.texts().join(" ");
    let truncated: String = context.chars().take(max_chars).collect();
    format!("Based on what I found, here's a response: {}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::types::{Document, RetrievedDocument};

    fn result(texts: &[&str]) -> RetrievalResult {
        RetrievalResult {
            generation: 1,
            documents: texts
                .iter()
                .enumerate()
                .map(|(position, text)| RetrievedDocument {
                    position,
                    distance: position as f32,
                    document: Document {
                        source_id: format!("doc-{}", position),
                        raw_text: text.to_string(),
                        normalized_text: text.to_string(),
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn test_joins_in_rank_order() {
        let response = compose_response(&result(&["First.", "Second."]), 500);
        assert_eq!(
            response,
            "Based on what I found, here's a response: First. Second...."
        );
    }

    #[test]
    fn test_truncates_context() {
        let long = "a".repeat(600);
        let response = compose_response(&result(&[&long]), 500);
        let context = response
            .strip_prefix("Based on what I found, here's a response: ")
            .and_then(|s| s.strip_suffix("..."))
            .unwrap();
        assert_eq!(context.len(), 500);
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let response = compose_response(&result(&["héllo wörld"]), 4);
        assert_eq!(response, "Based on what I found, here's a response: héll...");
    }

    #[test]
    fn test_empty_result() {
        assert_eq!(
            compose_response(&RetrievalResult::default(), 500),
            NO_RESULTS_MESSAGE
        );
    }
}
