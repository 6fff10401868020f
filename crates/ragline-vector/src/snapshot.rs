//! Immutable corpus snapshots and their single publication point.
//!
//! A [`CorpusSnapshot`] pairs an index with the exact documents it was built
//! from. Snapshots are never mutated; a refresh builds a new one off to the
//! side and [`SnapshotStore::publish`] swaps the shared `Arc` in one step.
//! Readers clone the `Arc` once and keep using it for the whole query.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info};

use ragline_core::error::{RaglineError, Result};
use ragline_core::types::Document;

use crate::index::{FlatL2Index, VectorIndex};

/// File name of the persisted index inside the data directory.
pub const INDEX_FILE: &str = "index.bin";
/// File name of the persisted document manifest inside the data directory.
pub const MANIFEST_FILE: &str = "documents.json";

/// An index together with the documents it was built from.
///
/// Position `i` in the index always resolves to `documents[i]`.
#[derive(Debug)]
pub struct CorpusSnapshot<I = FlatL2Index> {
    documents: Vec<Document>,
    index: I,
    generation: u64,
    model_id: String,
    built_at: DateTime<Utc>,
}

/// On-disk companion of the index file.
///
/// `index_sha256` ties the manifest to the exact index bytes it was written
/// with, so a manifest is never paired with another cycle's index.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    generation: u64,
    model_id: String,
    dimension: usize,
    index_sha256: String,
    built_at: DateTime<Utc>,
    documents: Vec<Document>,
}

impl<I: VectorIndex> CorpusSnapshot<I> {
    /// Pair an index with its documents.
    ///
    /// Fails if the two disagree on length, since positions would no longer
    /// map back to the right text.
    pub fn new(
        documents: Vec<Document>,
        index: I,
        generation: u64,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        if documents.len() != index.len() {
            return Err(RaglineError::CorruptIndex(format!(
                "snapshot has {} documents but its index holds {} vectors",
                documents.len(),
                index.len()
            )));
        }
        Ok(Self {
            documents,
            index,
            generation,
            model_id: model_id.into(),
            built_at: Utc::now(),
        })
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Write `index.bin` and `documents.json` into `dir`.
    ///
    /// The manifest is written after the index and records its checksum. If
    /// the process dies between the two writes, the stale manifest no longer
    /// matches the new index and [`restore`](Self::restore) refuses the pair.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let index_path = dir.join(INDEX_FILE);
        self.index.save(&index_path)?;
        let index_sha256 = sha256_hex(&std::fs::read(&index_path)?);

        let manifest = Manifest {
            generation: self.generation,
            model_id: self.model_id.clone(),
            dimension: self.index.dimension(),
            index_sha256,
            built_at: self.built_at,
            documents: self.documents.clone(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let tmp_path = manifest_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(&manifest)?)?;
        std::fs::rename(&tmp_path, &manifest_path)?;

        debug!(
            dir = %dir.display(),
            generation = self.generation,
            documents = self.documents.len(),
            "Snapshot persisted"
        );
        Ok(())
    }

    /// Reload a snapshot written by [`persist`](Self::persist).
    ///
    /// Every inconsistency is reported as `CorruptIndex` so the caller can
    /// fall back to rebuilding from the corpus source.
    pub fn restore(dir: &Path, dimension: usize, model_id: &str) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&manifest_path).map_err(|e| {
            RaglineError::CorruptIndex(format!("cannot read {}: {}", manifest_path.display(), e))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| RaglineError::CorruptIndex(format!("bad manifest: {}", e)))?;

        if manifest.model_id != model_id {
            return Err(RaglineError::CorruptIndex(format!(
                "snapshot was built with model {:?}, current model is {:?}",
                manifest.model_id, model_id
            )));
        }
        if manifest.dimension != dimension {
            return Err(RaglineError::CorruptIndex(format!(
                "manifest dimension {} does not match requested dimension {}",
                manifest.dimension, dimension
            )));
        }

        let index_path = dir.join(INDEX_FILE);
        let index_bytes = std::fs::read(&index_path).map_err(|e| {
            RaglineError::CorruptIndex(format!("cannot read {}: {}", index_path.display(), e))
        })?;
        if sha256_hex(&index_bytes) != manifest.index_sha256 {
            return Err(RaglineError::CorruptIndex(format!(
                "index file does not match the generation {} manifest",
                manifest.generation
            )));
        }

        let index = I::load(&index_path, dimension)?;
        if index.len() != manifest.documents.len() {
            return Err(RaglineError::CorruptIndex(format!(
                "index holds {} vectors but manifest lists {} documents",
                index.len(),
                manifest.documents.len()
            )));
        }

        info!(
            dir = %dir.display(),
            generation = manifest.generation,
            documents = manifest.documents.len(),
            "Snapshot restored from disk"
        );

        Ok(Self {
            documents: manifest.documents,
            index,
            generation: manifest.generation,
            model_id: manifest.model_id,
            built_at: manifest.built_at,
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Holder of the currently published snapshot.
///
/// Cloning the store is cheap and every clone sees the same publications.
#[derive(Debug)]
pub struct SnapshotStore<I = FlatL2Index> {
    tx: Arc<watch::Sender<Option<Arc<CorpusSnapshot<I>>>>>,
}

impl<I> Clone for SnapshotStore<I> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<I: VectorIndex> SnapshotStore<I> {
    /// A store with nothing published yet.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Capture the published snapshot, if any.
    ///
    /// The returned `Arc` stays valid and unchanged however many refreshes
    /// complete afterwards.
    pub fn current(&self) -> Option<Arc<CorpusSnapshot<I>>> {
        self.tx.borrow().clone()
    }

    /// Generation of the published snapshot, or 0 before the first publish.
    pub fn generation(&self) -> u64 {
        self.tx.borrow().as_ref().map_or(0, |s| s.generation())
    }

    /// Replace the published snapshot in one step.
    pub fn publish(&self, snapshot: CorpusSnapshot<I>) -> Arc<CorpusSnapshot<I>> {
        let snapshot = Arc::new(snapshot);
        self.tx.send_replace(Some(Arc::clone(&snapshot)));
        snapshot
    }

    /// Watch future publications.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CorpusSnapshot<I>>>> {
        self.tx.subscribe()
    }
}

impl<I: VectorIndex> Default for SnapshotStore<I> {
    fn default() -> Self {
        Self::new()
    }
}
