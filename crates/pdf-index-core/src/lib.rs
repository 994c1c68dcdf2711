//! # pdf-index core
//!
//! Pure, I/O-free building blocks for the pdf-index pipeline: the record
//! types that flow between stages, the recursive chunk splitter, the
//! embedding model traits, and the flat vector index.
//!
//! Nothing here touches the filesystem, spawns threads, or depends on an
//! async runtime. Persistence, model backends, and orchestration live in
//! the `pdf-index` app crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
