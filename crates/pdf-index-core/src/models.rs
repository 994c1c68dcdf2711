//! Records that flow through the ingestion pipeline.
//!
//! ```text
//! Document ──extract──▶ PageText ──split──▶ Chunk ──embed──▶ EmbeddedChunk
//! ```
//!
//! Every record is immutable once produced and consumed exactly once by the
//! next stage.

use serde::{Deserialize, Serialize};

/// Raw document bytes as produced by a document source.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source-relative identifier (for the filesystem source, the path
    /// relative to the input directory).
    pub source_id: String,
    pub bytes: Vec<u8>,
}

/// Text of one page of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub source_id: String,
    /// Zero-based position of the page in its document.
    pub page_index: usize,
    pub text: String,
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkOrigin {
    pub source_id: String,
    pub page_index: usize,
    /// Zero-based position of the chunk within its page.
    pub chunk_index: usize,
}

/// A bounded-length piece of page text, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// `None` when origin tracking is switched off.
    pub origin: Option<ChunkOrigin>,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: None,
        }
    }
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub text: String,
    pub vector: Vec<f32>,
    pub origin: Option<ChunkOrigin>,
}

impl EmbeddedChunk {
    /// Attach a vector to a chunk, consuming it.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            text: chunk.text,
            vector,
            origin: chunk.origin,
        }
    }
}
