//! Vector index with exhaustive squared-L2 nearest-neighbor search.
//!
//! `FlatL2Index` compares the query against every stored vector, which is
//! fine for corpora of a few thousand documents. Anything smarter (HNSW,
//! IVF) can sit behind the same [`VectorIndex`] trait as long as it keeps
//! the ordering, tie-break and dimension checks.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ragline_core::error::{RaglineError, Result};
use ragline_core::types::EmbeddingVector;

/// File magic for persisted indexes.
const MAGIC: [u8; 4] = *b"RGLX";
/// Bumped whenever the on-disk layout changes.
const FORMAT_VERSION: u16 = 1;
/// magic + version + dimension + count
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// A single hit returned from a vector search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Position of the matching vector in build order.
    pub position: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Capability interface for nearest-neighbor indexes.
///
/// Contract shared by every implementation:
/// - `build` keeps the given order; position `i` is the `i`-th vector.
/// - `search` returns at most `k` hits by ascending distance, ties broken by
///   ascending position, and rejects queries of the wrong dimension.
/// - `load(save(index))` answers every query exactly like `index`.
pub trait VectorIndex: Send + Sync + Sized {
    fn build(vectors: Vec<EmbeddingVector>) -> Result<Self>;

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path, dimension: usize) -> Result<Self>;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact index storing all vectors in one contiguous row-major buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buffer.extend_from_slice(&MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buffer.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for value in &self.data {
            buffer.extend_from_slice(&value.to_le_bytes());
        }
        buffer
    }

    fn decode(bytes: &[u8], dimension: usize) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RaglineError::CorruptIndex(format!(
                "file is {} bytes, shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(RaglineError::CorruptIndex("bad magic".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(RaglineError::CorruptIndex(format!(
                "unsupported format version {}",
                version
            )));
        }

        let stored_dimension = read_u32(bytes, 6) as usize;
        if stored_dimension != dimension {
            return Err(RaglineError::CorruptIndex(format!(
                "stored dimension {} does not match requested dimension {}",
                stored_dimension, dimension
            )));
        }
        if stored_dimension == 0 {
            return Err(RaglineError::CorruptIndex("zero dimension".to_string()));
        }

        let count = read_u32(bytes, 10) as usize;
        let expected_len = count
            .checked_mul(stored_dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| RaglineError::CorruptIndex("vector count overflows".to_string()))?;
        if bytes.len() != expected_len {
            return Err(RaglineError::CorruptIndex(format!(
                "expected {} bytes for {} vectors, found {}",
                expected_len,
                count,
                bytes.len()
            )));
        }
        if count == 0 {
            return Err(RaglineError::CorruptIndex("index holds no vectors".to_string()));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            dimension: stored_dimension,
            data,
        })
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Ascending distance, then ascending position.
fn hit_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

impl VectorIndex for FlatL2Index {
    fn build(vectors: Vec<EmbeddingVector>) -> Result<Self> {
        let dimension = match vectors.first() {
            Some(first) => first.len(),
            None => return Err(RaglineError::EmptyCorpus),
        };
        if dimension == 0 {
            return Err(RaglineError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(RaglineError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dimension, data })
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RaglineError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = (0..self.len())
            .map(|position| SearchHit {
                position,
                distance: squared_l2(query, self.row(position)),
            })
            .collect();

        let k = k.min(hits.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, hit_order);
            hits.truncate(k);
        }
        hits.sort_by(hit_order);

        Ok(hits)
    }

    /// Write the index to `path`, replacing any previous file atomically.
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&self.encode())?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn load(path: &Path, dimension: usize) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RaglineError::CorruptIndex(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::decode(&bytes, dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }
}
