//! Query-time retrieval.
//!
//! The Retriever embeds a query, captures the published snapshot once and
//! maps index hits back to documents. Every entry in a result comes from that
//! one snapshot even if a refresh publishes mid-query.

use tracing::debug;

use ragline_core::error::{RaglineError, Result};
use ragline_core::types::{Query, RetrievalResult, RetrievedDocument};

use crate::embedding::{EmbeddingService, SharedEmbedding};
use crate::index::{FlatL2Index, VectorIndex};
use crate::normalize::normalize;
use crate::snapshot::SnapshotStore;

/// Finds the documents nearest to a query in the published snapshot.
///
/// Uses dynamic dispatch ([`SharedEmbedding`]) so the same model instance can
/// be shared with the refresh controller.
pub struct Retriever<I = FlatL2Index> {
    store: SnapshotStore<I>,
    embedder: SharedEmbedding,
}

impl<I> Clone for Retriever<I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            embedder: self.embedder.clone(),
        }
    }
}

impl<I: VectorIndex> Retriever<I> {
    pub fn new(store: SnapshotStore<I>, embedder: impl EmbeddingService + 'static) -> Self {
        Self {
            store,
            embedder: SharedEmbedding::new(embedder),
        }
    }

    pub fn new_dyn(store: SnapshotStore<I>, embedder: impl Into<SharedEmbedding>) -> Self {
        Self {
            store,
            embedder: embedder.into(),
        }
    }

    pub fn store(&self) -> &SnapshotStore<I> {
        &self.store
    }

    /// Return up to `k` documents nearest to `text`, nearest first.
    ///
    /// The query text is normalized the same way documents are. Fails with
    /// `InvalidQuery` for `k == 0` or a blank query, and with `NoSnapshot`
    /// before the first refresh has published anything.
    pub async fn retrieve(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RaglineError::InvalidQuery("k must be at least 1".to_string()));
        }
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(RaglineError::InvalidQuery("query text is empty".to_string()));
        }

        let query_vec = self.embedder.embed_one(&normalized).await?;

        // Captured once; every entry below comes from this snapshot.
        let snapshot = self.store.current().ok_or(RaglineError::NoSnapshot)?;
        let hits = snapshot.index().search(&query_vec, k)?;

        let mut documents = Vec::with_capacity(hits.len());
        for hit in hits {
            let document = snapshot.document(hit.position).ok_or_else(|| {
                RaglineError::CorruptIndex(format!(
                    "index returned position {} but snapshot has {} documents",
                    hit.position,
                    snapshot.len()
                ))
            })?;
            documents.push(RetrievedDocument {
                position: hit.position,
                distance: hit.distance,
                document: document.clone(),
            });
        }

        debug!(
            generation = snapshot.generation(),
            k,
            returned = documents.len(),
            "Retrieval complete"
        );

        Ok(RetrievalResult {
            generation: snapshot.generation(),
            documents,
        })
    }

    pub async fn retrieve_query(&self, query: &Query) -> Result<RetrievalResult> {
        self.retrieve(&query.text, query.k).await
    }
}
