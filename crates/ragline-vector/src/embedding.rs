//! Embedding service trait and implementations.
//!
//! - `OnnxEmbeddingService` loads a sentence-transformer ONNX model (e.g.
//!   all-MiniLM-L6-v2) via ort and tokenizes with the HuggingFace tokenizers
//!   crate. This is the production embedding backend.
//! - `HashEmbedding` provides deterministic hash-based vectors for tests,
//!   benchmarks and offline runs.
//!
//! Nothing here caches. A failed embedding is always reported, never replaced
//! with a zero vector.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ort::session::Session;
use ort::value::TensorRef;
use ragline_core::error::{RaglineError, Result};
use ragline_core::types::EmbeddingVector;
use sha2::{Digest, Sha256};
use tokenizers::Tokenizer;
use tracing::info;

/// Service for generating text embeddings.
///
/// Implementations convert text into vectors of a fixed dimension `D` that
/// stays constant for the lifetime of the service.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed_one(&self, text: &str) -> impl Future<Output = Result<EmbeddingVector>> + Send;

    /// Embed a batch of texts, preserving order.
    ///
    /// Fails on the first text the model cannot embed; the error names that
    /// text so the caller can decide whether to skip it or abort.
    fn embed_many(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<EmbeddingVector>>> + Send {
        async move {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(self.embed_one(text).await?);
            }
            Ok(vectors)
        }
    }

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;

    /// Identifier of the loaded model, recorded alongside persisted snapshots.
    fn model_id(&self) -> &str;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService` returns `impl Future` and so cannot be made into a
/// trait object. This trait boxes the futures instead, and a blanket impl
/// covers every `EmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_one_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<EmbeddingVector>>;

    fn embed_many_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<EmbeddingVector>>>;

    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_one_boxed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<EmbeddingVector>> {
        Box::pin(self.embed_one(text))
    }

    fn embed_many_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<EmbeddingVector>>> {
        Box::pin(self.embed_many(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }

    fn model_id(&self) -> &str {
        EmbeddingService::model_id(self)
    }
}

/// A cloneable handle to one runtime-selected model.
///
/// Lets the refresh controller and the retriever share a single backend
/// chosen from configuration.
#[derive(Clone)]
pub struct SharedEmbedding(Arc<dyn DynEmbeddingService>);

impl SharedEmbedding {
    pub fn new(service: impl EmbeddingService + 'static) -> Self {
        Self(Arc::new(service))
    }
}

impl From<Arc<dyn DynEmbeddingService>> for SharedEmbedding {
    fn from(service: Arc<dyn DynEmbeddingService>) -> Self {
        Self(service)
    }
}

impl std::fmt::Debug for SharedEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEmbedding")
            .field("model_id", &self.0.model_id())
            .field("dimensions", &self.0.dimensions())
            .finish()
    }
}

impl EmbeddingService for SharedEmbedding {
    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        self.0.embed_one_boxed(text).await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        self.0.embed_many_boxed(texts).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }

    fn model_id(&self) -> &str {
        self.0.model_id()
    }
}

// ---------------------------------------------------------------------------
// OnnxEmbeddingService - real ONNX Runtime inference
// ---------------------------------------------------------------------------

/// ONNX Runtime-backed embedding service using a sentence-transformer model.
///
/// Expects a model directory containing:
/// - `model.onnx`: the sentence-transformer ONNX export
/// - `tokenizer.json`: the HuggingFace fast-tokenizer file
///
/// The model should accept `input_ids`, `attention_mask` and `token_type_ids`
/// as i64 inputs and produce token-level embeddings. Mean pooling (masked) is
/// applied to produce a single vector per input, which is then L2-normalized.
pub struct OnnxEmbeddingService {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    dimensions: usize,
    model_id: String,
}

impl std::fmt::Debug for OnnxEmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingService")
            .field("model_id", &self.model_id)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl OnnxEmbeddingService {
    /// Load a sentence-transformer model from the given directory.
    ///
    /// The directory must contain `model.onnx` and `tokenizer.json`.
    pub fn from_directory(model_dir: &Path, model_id: &str) -> Result<Self> {
        Self::from_files(
            &model_dir.join("model.onnx"),
            &model_dir.join("tokenizer.json"),
            model_id,
        )
    }

    /// Load from explicit model and tokenizer file paths.
    pub fn from_files(model_path: &Path, tokenizer_path: &Path, model_id: &str) -> Result<Self> {
        if !model_path.exists() {
            return Err(RaglineError::Config(format!(
                "ONNX model not found at {}",
                model_path.display()
            )));
        }
        if !tokenizer_path.exists() {
            return Err(RaglineError::Config(format!(
                "Tokenizer not found at {}",
                tokenizer_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| RaglineError::Config(format!("ONNX session builder: {}", e)))?
            .with_intra_threads(1)
            .map_err(|e| RaglineError::Config(format!("ONNX set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| RaglineError::Config(format!("ONNX load model: {}", e)))?;

        // Sentence-transformer output is typically [batch, seq_len, hidden_dim].
        let dimensions = session
            .outputs()
            .first()
            .and_then(|out| out.dtype().tensor_shape())
            .and_then(|shape| shape.last().copied())
            .map(|d| if d > 0 { d as usize } else { 384 })
            .unwrap_or(384);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RaglineError::Config(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            model = %model_path.display(),
            model_id,
            dimensions,
            "Loaded ONNX embedding model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            dimensions,
            model_id: model_id.to_string(),
        })
    }
}

/// Tokenize, run inference, and mean-pool the output.
fn embed_sync(session: &Mutex<Session>, tokenizer: &Tokenizer, text: &str) -> Result<EmbeddingVector> {
    let fail = |reason: String| RaglineError::embedding(text, reason);

    if text.is_empty() {
        return Err(fail("cannot embed empty text".to_string()));
    }

    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| fail(format!("tokenization failed: {}", e)))?;

    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| m as i64)
        .collect();
    let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

    let seq_len = input_ids.len();

    let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
        .map_err(|e| fail(format!("input_ids array: {}", e)))?;
    let mask_array = ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
        .map_err(|e| fail(format!("attention_mask array: {}", e)))?;
    let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
        .map_err(|e| fail(format!("token_type_ids array: {}", e)))?;

    let ids_ref = TensorRef::from_array_view(&ids_array)
        .map_err(|e| fail(format!("TensorRef input_ids: {}", e)))?;
    let mask_ref = TensorRef::from_array_view(&mask_array)
        .map_err(|e| fail(format!("TensorRef attention_mask: {}", e)))?;
    let type_ref = TensorRef::from_array_view(&type_array)
        .map_err(|e| fail(format!("TensorRef token_type_ids: {}", e)))?;

    let mut session = session
        .lock()
        .map_err(|e| fail(format!("session lock poisoned: {}", e)))?;
    let outputs = session
        .run(ort::inputs![ids_ref, mask_ref, type_ref])
        .map_err(|e| fail(format!("ONNX inference failed: {}", e)))?;

    // [1, seq_len, hidden_dim] as a flat slice.
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| fail(format!("extract embeddings: {}", e)))?;

    let shape_dims: Vec<i64> = shape.iter().copied().collect();
    let hidden_dim = match shape_dims.as_slice() {
        [.., _, last] if *last > 0 => *last as usize,
        _ => return Err(fail(format!("unexpected output shape: {:?}", shape_dims))),
    };
    if data.len() < seq_len * hidden_dim {
        return Err(fail(format!(
            "output has {} values, expected at least {}",
            data.len(),
            seq_len * hidden_dim
        )));
    }

    let mut pooled = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;

    for (tok_idx, &mask_val) in attention_mask.iter().enumerate() {
        if mask_val > 0 {
            let offset = tok_idx * hidden_dim;
            for (dim, value) in pooled.iter_mut().enumerate() {
                *value += data[offset + dim];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut pooled {
            *val /= count;
        }
    }

    l2_normalize(&mut pooled);
    Ok(pooled)
}

impl EmbeddingService for OnnxEmbeddingService {
    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        // Inference is CPU-bound; run it on a blocking thread.
        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text_owned = text.to_string();

        let vector = tokio::task::spawn_blocking(move || {
            embed_sync(&session, &tokenizer, &text_owned)
        })
        .await
        .map_err(|e| RaglineError::embedding(text, format!("embedding task panicked: {}", e)))??;

        if vector.len() != self.dimensions {
            return Err(RaglineError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in values {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Embedding service that derives unit vectors from a hash of the input.
///
/// Identical inputs always produce identical outputs, which is enough to
/// exercise indexing, ties and retrieval without a real model.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedding {
    /// 384 dimensions, matching all-MiniLM-L6-v2.
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_id: format!("hash-{}", dimensions),
        }
    }

    /// SHA-256 over the text and a block counter; each digest yields four
    /// components. The output never depends on the toolchain, so persisted
    /// vectors stay comparable with fresh query embeddings.
    fn hash_to_vector(&self, text: &str) -> EmbeddingVector {
        let mut result = Vec::with_capacity(self.dimensions);
        let mut block: u32 = 0;
        while result.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_le_bytes());
            let digest = hasher.finalize();

            for chunk in digest.chunks_exact(8) {
                if result.len() == self.dimensions {
                    break;
                }
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                let h = u64::from_le_bytes(word);
                let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
                result.push(val as f32);
            }
            block += 1;
        }

        l2_normalize(&mut result);
        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        if text.is_empty() {
            return Err(RaglineError::embedding(text, "cannot embed empty text"));
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
