//! Per-page PDF text extraction.
//!
//! Extraction is fault-tolerant at two levels: a document whose container
//! cannot be opened yields [`ExtractOutcome::Unreadable`], and a page whose
//! content cannot be decoded is recorded as a [`PageSkip`] while the rest of
//! the document is still extracted. Nothing here returns an error or panics
//! past [`extract`]; the pipeline decides what to log and count.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use lopdf::Document as PdfDocument;
use pdf_index_core::models::{Document, PageText};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::{PipelineContext, RunStats};
use crate::pipeline::FlatMap;

/// Why a document could not be read at all.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a readable PDF: {0}")]
    Open(String),
    #[error("PDF parser panicked: {0}")]
    Panicked(String),
}

/// A page that was present but whose text could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSkip {
    pub page_index: usize,
    pub reason: String,
}

/// Result of extracting one document.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// The container could not be opened. Contributes no pages.
    Unreadable(ExtractError),
    /// The container opened but has no pages.
    Empty,
    /// Text of every decodable page in document order, plus the pages that
    /// were skipped.
    Extracted {
        pages: Vec<PageText>,
        skipped: Vec<PageSkip>,
    },
}

impl ExtractOutcome {
    pub fn pages(&self) -> &[PageText] {
        match self {
            ExtractOutcome::Extracted { pages, .. } => pages,
            _ => &[],
        }
    }
}

/// Extract the text of every page of `document`.
pub fn extract(document: &Document) -> ExtractOutcome {
    match catch_unwind(AssertUnwindSafe(|| extract_pages(document))) {
        Ok(outcome) => outcome,
        Err(payload) => ExtractOutcome::Unreadable(ExtractError::Panicked(panic_message(&*payload))),
    }
}

fn extract_pages(document: &Document) -> ExtractOutcome {
    let pdf = match PdfDocument::load_mem(&document.bytes) {
        Ok(pdf) => pdf,
        Err(e) => return ExtractOutcome::Unreadable(ExtractError::Open(e.to_string())),
    };

    let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return ExtractOutcome::Empty;
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    let mut skipped = Vec::new();
    for (page_index, page_number) in page_numbers.into_iter().enumerate() {
        let text = catch_unwind(AssertUnwindSafe(|| pdf.extract_text(&[page_number])));
        match text {
            Ok(Ok(text)) => pages.push(PageText {
                source_id: document.source_id.clone(),
                page_index,
                text,
            }),
            Ok(Err(e)) => skipped.push(PageSkip {
                page_index,
                reason: e.to_string(),
            }),
            Err(payload) => skipped.push(PageSkip {
                page_index,
                reason: format!("parser panicked: {}", panic_message(&*payload)),
            }),
        }
    }

    ExtractOutcome::Extracted { pages, skipped }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The extraction stage: one document in, zero or more pages out.
///
/// Records outcomes in the run statistics and logs every skip.
pub struct ExtractStage {
    stats: Arc<RunStats>,
}

impl ExtractStage {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            stats: Arc::clone(ctx.stats()),
        }
    }
}

impl FlatMap for ExtractStage {
    type In = Document;
    type Out = PageText;

    fn apply(&self, document: Document) -> Vec<PageText> {
        match extract(&document) {
            ExtractOutcome::Unreadable(e) => {
                warn!(source_id = %document.source_id, error = %e, "skipping unreadable document");
                RunStats::add(&self.stats.documents_skipped, 1);
                Vec::new()
            }
            ExtractOutcome::Empty => {
                debug!(source_id = %document.source_id, "document has no pages");
                RunStats::add(&self.stats.documents_empty, 1);
                Vec::new()
            }
            ExtractOutcome::Extracted { pages, skipped } => {
                for skip in &skipped {
                    warn!(
                        source_id = %document.source_id,
                        page = skip.page_index,
                        reason = %skip.reason,
                        "skipping undecodable page"
                    );
                }
                RunStats::add(&self.stats.pages_skipped, skipped.len() as u64);
                RunStats::add(&self.stats.pages_extracted, pages.len() as u64);
                debug!(source_id = %document.source_id, pages = pages.len(), "extracted");
                pages
            }
        }
    }
}
