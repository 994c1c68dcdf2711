//! Run-scoped pipeline state.
//!
//! A [`PipelineContext`] is built once per run from [`PipelineSettings`] and
//! passed by reference to every stage and to the worker pool. It owns the
//! validated splitter configuration, the shared run counters, and the
//! progress reporter. [`PipelineContext::teardown`] consumes it and returns
//! the final [`RunReport`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use pdf_index_core::chunk::SplitterConfig;

use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Resolved knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub track_origin: bool,
    /// Chunks per batch handed to the worker pool.
    pub embedding_batch_size: usize,
    /// Batch size passed through to the model's encode call.
    pub encode_batch_size: usize,
    pub pool_size: usize,
    /// Documents extracted concurrently.
    pub extract_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: pdf_index_core::chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: pdf_index_core::chunk::DEFAULT_CHUNK_OVERLAP,
            track_origin: true,
            embedding_batch_size: 100,
            encode_batch_size: 100,
            pool_size: 20,
            extract_concurrency: 4,
        }
    }
}

/// Counters shared by every stage of a run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub documents_seen: AtomicU64,
    /// Documents that could not be fetched or opened.
    pub documents_skipped: AtomicU64,
    /// Documents that opened but had no pages.
    pub documents_empty: AtomicU64,
    pub pages_extracted: AtomicU64,
    pub pages_skipped: AtomicU64,
    pub chunks_produced: AtomicU64,
    pub batches_embedded: AtomicU64,
    pub chunks_embedded: AtomicU64,
}

impl RunStats {
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RunReport {
    pub documents_seen: u64,
    pub documents_skipped: u64,
    pub documents_empty: u64,
    pub pages_extracted: u64,
    pub pages_skipped: u64,
    pub chunks_produced: u64,
    pub batches_embedded: u64,
    pub chunks_embedded: u64,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Explicit state for one pipeline run.
pub struct PipelineContext {
    settings: PipelineSettings,
    splitter: SplitterConfig,
    stats: Arc<RunStats>,
    progress: Arc<dyn ProgressReporter>,
    started: Instant,
}

impl PipelineContext {
    /// Validate `settings` and set up a fresh run.
    pub fn new(settings: PipelineSettings, progress: Box<dyn ProgressReporter>) -> Result<Self> {
        let splitter = SplitterConfig::new(settings.chunk_size, settings.chunk_overlap)
            .context("Invalid chunking settings")?;
        if settings.embedding_batch_size == 0 {
            bail!("embedding batch size must be > 0");
        }
        if settings.encode_batch_size == 0 {
            bail!("encode batch size must be > 0");
        }
        if settings.pool_size == 0 {
            bail!("pool size must be > 0");
        }
        if settings.extract_concurrency == 0 {
            bail!("extract concurrency must be > 0");
        }

        Ok(Self {
            settings,
            splitter,
            stats: Arc::new(RunStats::default()),
            progress: Arc::from(progress),
            started: Instant::now(),
        })
    }

    /// A context that reports no progress.
    pub fn with_settings(settings: PipelineSettings) -> Result<Self> {
        Self::new(settings, Box::new(NoProgress))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn splitter(&self) -> &SplitterConfig {
        &self.splitter
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub fn report(&self, event: ProgressEvent) {
        self.progress.report(event);
    }

    /// Snapshot the counters without ending the run.
    pub fn snapshot(&self) -> RunReport {
        let s = &self.stats;
        RunReport {
            documents_seen: RunStats::get(&s.documents_seen),
            documents_skipped: RunStats::get(&s.documents_skipped),
            documents_empty: RunStats::get(&s.documents_empty),
            pages_extracted: RunStats::get(&s.pages_extracted),
            pages_skipped: RunStats::get(&s.pages_skipped),
            chunks_produced: RunStats::get(&s.chunks_produced),
            batches_embedded: RunStats::get(&s.batches_embedded),
            chunks_embedded: RunStats::get(&s.chunks_embedded),
            elapsed: self.started.elapsed(),
        }
    }

    /// End the run.
    pub fn teardown(self) -> RunReport {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_settings() {
        let bad_overlap = PipelineSettings {
            chunk_size: 10,
            chunk_overlap: 10,
            ..Default::default()
        };
        assert!(PipelineContext::with_settings(bad_overlap).is_err());

        let no_workers = PipelineSettings {
            pool_size: 0,
            ..Default::default()
        };
        assert!(PipelineContext::with_settings(no_workers).is_err());

        let no_batch = PipelineSettings {
            embedding_batch_size: 0,
            ..Default::default()
        };
        assert!(PipelineContext::with_settings(no_batch).is_err());
    }

    #[test]
    fn teardown_reports_counters() {
        let ctx = PipelineContext::with_settings(PipelineSettings::default()).unwrap();
        RunStats::add(&ctx.stats().documents_seen, 3);
        RunStats::add(&ctx.stats().chunks_produced, 7);
        let report = ctx.teardown();
        assert_eq!(report.documents_seen, 3);
        assert_eq!(report.chunks_produced, 7);
        assert_eq!(report.chunks_embedded, 0);
    }
}
