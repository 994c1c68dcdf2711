//! # pdf-index
//!
//! Turn a directory of PDF documents into a persisted vector index.
//!
//! pdf-index extracts the text of every page, splits it into bounded,
//! overlapping chunks, embeds every chunk on a fixed-size pool of
//! model-holding workers, and writes the `(text, vector)` pairs to an index
//! directory that a later process can load and query.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌─────────┐   ┌─────────────┐   ┌───────────┐
//! │  Source    │──▶│ Extract ─▶ Split │──▶│ Batcher │──▶│ Worker pool │──▶│ FlatIndex │
//! │ (fs/mem)   │   │ (blocking tasks) │   │         │   │ (N models)  │   │  (save)   │
//! └────────────┘   └──────────────────┘   └─────────┘   └─────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pidx init                       # write ./config/pidx.toml
//! pidx build                      # ./documents -> ./faiss_index
//! pidx info ./faiss_index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`context`] | Run-scoped settings, counters, and report |
//! | [`sources`] | Document source trait and in-memory source |
//! | [`connector_fs`] | Filesystem document source |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`chunk`] | Splitting stage |
//! | [`embedding`] | Local embedding backends |
//! | [`pool`] | Fixed-size embedding worker pool |
//! | [`pipeline`] | Streaming coordinator, batching, backpressure |
//! | [`index_store`] | Index persistence |
//! | [`ingest`] | Build orchestration |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | Index summaries |

pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod context;
pub mod embedding;
pub mod extract;
pub mod index_store;
pub mod ingest;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod sources;
pub mod stats;

pub use pdf_index_core::models;
