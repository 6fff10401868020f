//! Ragline vector crate - embeddings, exact L2 index, snapshots, refresh and retrieval.
//!
//! Provides the embedding service trait with an ONNX backend and a
//! deterministic hash backend, an exhaustive L2 index with a binary on-disk
//! format, immutable corpus snapshots published through a single store, the
//! background refresh controller, and the query-time retriever.

pub mod embedding;
pub mod index;
pub mod normalize;
pub mod refresh;
pub mod retrieval;
pub mod snapshot;
pub mod source;

pub use embedding::{
    DynEmbeddingService, EmbeddingService, HashEmbedding, OnnxEmbeddingService, SharedEmbedding,
};
pub use index::{FlatL2Index, SearchHit, VectorIndex};
pub use normalize::{normalize, normalize_document};
pub use refresh::{
    RefreshController, RefreshHandle, RefreshOutcome, RefreshState, MIN_REFRESH_INTERVAL,
};
pub use retrieval::Retriever;
pub use snapshot::{CorpusSnapshot, SnapshotStore};
pub use source::{CorpusSource, StaticCorpus};
