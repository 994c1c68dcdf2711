//! Document sources.
//!
//! A [`DocumentSource`] produces the raw bytes the pipeline extracts text
//! from. Listing and fetching are separate so the coordinator can bound how
//! many documents are held in memory at once: `list` returns cheap
//! [`DocumentRef`]s, and `fetch` loads one document's bytes when the pipeline
//! is ready for it.
//!
//! | Source | Backing |
//! |--------|---------|
//! | [`FilesystemSource`](crate::connector_fs::FilesystemSource) | files under a directory |
//! | [`InMemorySource`] | fixed byte blobs (tests, embedding callers) |

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pdf_index_core::models::Document;
use std::path::PathBuf;

/// Handle to one document a source can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Stable identifier, carried into every chunk's origin.
    pub source_id: String,
    /// Location on disk, for sources that have one.
    pub path: Option<PathBuf>,
}

/// A producer of documents for ingestion.
///
/// # Example
///
/// ```rust
/// use pdf_index::sources::{DocumentSource, InMemorySource};
///
/// # #[tokio::main] async fn main() -> anyhow::Result<()> {
/// let source = InMemorySource::new("fixtures", vec![("a.pdf".into(), b"%PDF".to_vec())]);
/// let refs = source.list().await?;
/// assert_eq!(refs.len(), 1);
/// let doc = source.fetch(&refs[0]).await?;
/// assert_eq!(doc.source_id, "a.pdf");
/// # Ok(()) }
/// ```
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Label used in logs and progress output (e.g. `"filesystem:./documents"`).
    fn name(&self) -> String;

    /// List every document, sorted by `source_id`.
    ///
    /// Entries that cannot be inspected at listing time are dropped, not
    /// reported as errors. An error here is fatal to the run.
    async fn list(&self) -> Result<Vec<DocumentRef>>;

    /// Load one document's bytes.
    ///
    /// An error here skips the document; the run continues.
    async fn fetch(&self, doc: &DocumentRef) -> Result<Document>;
}

/// A source over a fixed set of `(source_id, bytes)` pairs.
pub struct InMemorySource {
    name: String,
    documents: Vec<(String, Vec<u8>)>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, documents: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            name: name.into(),
            documents,
        }
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn name(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn list(&self) -> Result<Vec<DocumentRef>> {
        let mut refs: Vec<DocumentRef> = self
            .documents
            .iter()
            .map(|(id, _)| DocumentRef {
                source_id: id.clone(),
                path: None,
            })
            .collect();
        refs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(refs)
    }

    async fn fetch(&self, doc: &DocumentRef) -> Result<Document> {
        self.documents
            .iter()
            .find(|(id, _)| *id == doc.source_id)
            .map(|(id, bytes)| Document {
                source_id: id.clone(),
                bytes: bytes.clone(),
            })
            .ok_or_else(|| anyhow!("No such document: {}", doc.source_id))
    }
}
