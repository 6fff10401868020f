use serde::{Deserialize, Serialize};

/// A fixed-length embedding produced by the embedding model.
pub type EmbeddingVector = Vec<f32>;

/// A single corpus document.
///
/// Immutable once it is part of a published snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier the corpus source fetched this document from (usually a URL).
    pub source_id: String,
    /// Text exactly as returned by the corpus source.
    pub raw_text: String,
    /// Whitespace-normalized text. This is what gets embedded.
    pub normalized_text: String,
}

/// A transient similarity query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    /// Maximum number of documents to return, at least 1.
    pub k: usize,
}

/// One document returned by a retrieval, with where and how close it was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Position of the document in the snapshot it was read from.
    pub position: usize,
    /// Squared L2 distance to the query embedding.
    pub distance: f32,
    pub document: Document,
}

/// Documents nearest to a query, in ascending distance order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Generation of the snapshot every entry was read from.
    pub generation: u64,
    pub documents: Vec<RetrievedDocument>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Snapshot positions of the results, nearest first.
    pub fn positions(&self) -> Vec<usize> {
        self.documents.iter().map(|d| d.position).collect()
    }

    /// Normalized texts of the results, nearest first.
    pub fn texts(&self) -> Vec<&str> {
        self.documents
            .iter()
            .map(|d| d.document.normalized_text.as_str())
            .collect()
    }
}
