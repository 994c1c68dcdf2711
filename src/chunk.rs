//! Chunking stage.
//!
//! Wraps the recursive splitter from `pdf-index-core` as a pipeline stage:
//! one [`PageText`] in, zero or more [`Chunk`]s out.

use std::sync::Arc;

pub use pdf_index_core::chunk::{split_page, split_text, SplitError, SplitterConfig};
use pdf_index_core::models::{Chunk, PageText};

use crate::context::{PipelineContext, RunStats};
use crate::pipeline::FlatMap;

/// Splits pages with the run's splitter configuration.
pub struct SplitStage {
    config: SplitterConfig,
    track_origin: bool,
    stats: Arc<RunStats>,
}

impl SplitStage {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            config: *ctx.splitter(),
            track_origin: ctx.settings().track_origin,
            stats: Arc::clone(ctx.stats()),
        }
    }
}

impl FlatMap for SplitStage {
    type In = PageText;
    type Out = Chunk;

    fn apply(&self, page: PageText) -> Vec<Chunk> {
        let chunks = split_page(&page, &self.config, self.track_origin);
        RunStats::add(&self.stats.chunks_produced, chunks.len() as u64);
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineSettings;

    fn page(text: &str) -> PageText {
        PageText {
            source_id: "doc.pdf".to_string(),
            page_index: 4,
            text: text.to_string(),
        }
    }

    #[test]
    fn tags_chunks_with_origin() {
        let ctx = PipelineContext::with_settings(PipelineSettings::default()).unwrap();
        let stage = SplitStage::new(&ctx);
        let chunks = stage.apply(page(&"word ".repeat(400)));
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            let origin = chunk.origin.as_ref().unwrap();
            assert_eq!(origin.source_id, "doc.pdf");
            assert_eq!(origin.page_index, 4);
            assert_eq!(origin.chunk_index, i);
        }
        assert_eq!(ctx.teardown().chunks_produced, 3);
    }

    #[test]
    fn origin_tracking_can_be_disabled() {
        let settings = PipelineSettings {
            track_origin: false,
            ..Default::default()
        };
        let ctx = PipelineContext::with_settings(settings).unwrap();
        let chunks = SplitStage::new(&ctx).apply(page("short page"));
        assert_eq!(chunks, vec![Chunk::new("short page")]);
    }

    #[test]
    fn blank_page_yields_nothing() {
        let ctx = PipelineContext::with_settings(PipelineSettings::default()).unwrap();
        assert!(SplitStage::new(&ctx).apply(page("  \n\n \t ")).is_empty());
    }
}
