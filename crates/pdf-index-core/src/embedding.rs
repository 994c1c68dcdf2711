//! Embedding model traits and vector utilities.
//!
//! An embedding backend is split into two halves:
//!
//! - [`ModelLoader`] performs the expensive, one-time setup (downloading
//!   weights, building the inference session). The worker pool calls it once
//!   per worker.
//! - [`EmbeddingModel`] is the loaded model, owned by exactly one worker and
//!   invoked once per batch.
//!
//! Concrete backends (fastembed, tract) live in the `pdf-index` app crate.

use thiserror::Error;

/// Errors raised while loading a model or encoding a batch.
///
/// All of these are fatal to a run: a missing or malformed vector would
/// leave the index silently inconsistent.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to load embedding model: {0}")]
    Load(String),
    #[error("embedding inference failed: {0}")]
    Inference(String),
    #[error("model returned {got} vectors for {expected} inputs")]
    Cardinality { expected: usize, got: usize },
    #[error("model returned a {got}-dimensional vector, expected {expected}")]
    Dimension { expected: usize, got: usize },
    #[error("worker {0} stopped before finishing its batch")]
    WorkerLost(usize),
    #[error("worker pool is shut down")]
    PoolClosed,
}

/// A loaded embedding model.
///
/// Implementations may hold non-`Sync` inference state; each instance is
/// confined to the worker thread that loaded it.
pub trait EmbeddingModel: Send {
    /// Model identifier (e.g. `"bge-base-en-v1.5"`).
    fn model_name(&self) -> &str;
    /// Output dimensionality, fixed for the model.
    fn dims(&self) -> usize;
    /// Encode `texts`, returning one vector per input in input order.
    ///
    /// `batch_size` is the model's internal inference batch size; it does not
    /// change the result.
    fn encode(&mut self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Builds [`EmbeddingModel`] instances, one per pool worker.
pub trait ModelLoader: Send + Sync {
    /// Model identifier the loaded models will report.
    fn model_name(&self) -> &str;
    /// Dimensionality the loaded models will report.
    fn dims(&self) -> usize;
    /// Load a fresh model instance for worker `worker_id`.
    fn load(&self, worker_id: usize) -> Result<Box<dyn EmbeddingModel>, EmbedError>;
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// # Example
///
/// ```rust
/// use pdf_index_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a float vector.
///
/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a whole `f32`
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
