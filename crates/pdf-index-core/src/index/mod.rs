//! Vector index abstraction.
//!
//! The [`IndexBackend`] trait is the seam between the pipeline and whatever
//! persists the embeddings. The pipeline hands it the complete, materialized
//! set of [`EmbeddedChunk`]s once every batch has finished, then asks it to
//! save the result to a directory.
//!
//! [`flat::FlatIndex`] is the built-in index: exact cosine search over an
//! in-memory table.

pub mod flat;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ChunkOrigin, EmbeddedChunk};

/// Errors raised while building, saving, or loading an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("entry {index} has a {got}-dimensional vector, index expects {expected}")]
    Dimension {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("index dimension must be > 0")]
    ZeroDimension,
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Content-derived identifier (hex SHA-256 of text and origin).
    pub id: String,
    pub text: String,
    pub origin: Option<ChunkOrigin>,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// A nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub origin: Option<ChunkOrigin>,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Builds and persists an index from embedded chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`build_from_pairs`](IndexBackend::build_from_pairs) | Construct an index from the full chunk set |
/// | [`save`](IndexBackend::save) | Write a self-contained copy to a directory |
pub trait IndexBackend: Send + Sync {
    /// The built index.
    type Handle: Send;

    /// Build an index from every embedded chunk of a run. The result must not
    /// depend on the order of `pairs`.
    fn build_from_pairs(&self, pairs: Vec<EmbeddedChunk>) -> Result<Self::Handle, IndexError>;

    /// Persist `index` to `dir`, replacing any previous index there.
    fn save(&self, index: &Self::Handle, dir: &Path) -> Result<(), IndexError>;
}
