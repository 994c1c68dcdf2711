//! Build orchestration.
//!
//! Coordinates a full build: source → extraction → splitting → pooled
//! embedding → index build → atomic save. The index is built only after the
//! pipeline has drained, and only if every chunk came back embedded.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pdf_index_core::index::IndexBackend;
use tracing::{info, warn};

use crate::config::Config;
use crate::connector_fs::FilesystemSource;
use crate::context::{PipelineContext, RunReport, RunStats};
use crate::embedding::create_loader;
use crate::index_store::FlatIndexBackend;
use crate::pipeline;
use crate::pool::WorkerPool;
use crate::progress::{emit_summary, ProgressEvent, ProgressMode};
use crate::sources::DocumentSource;

/// Command-line overrides for `pidx build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub pool_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub dry_run: bool,
    pub progress: Option<ProgressMode>,
}

impl BuildOptions {
    /// Apply the overrides to `config` and re-validate it.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(input) = &self.input {
            config.source.input_directory = input.clone();
        }
        if let Some(output) = &self.output {
            config.index.output_directory = output.clone();
        }
        if let Some(pool_size) = self.pool_size {
            config.embedding.pool_size = pool_size;
        }
        if let Some(batch_size) = self.batch_size {
            config.embedding.batch_size = batch_size;
        }
        config.validate()
    }
}

/// Run the pipeline over `source` and persist the result with `backend`.
///
/// # Errors
///
/// Any fatal pipeline error, a mismatch between chunks produced and chunks
/// embedded, or an index build/save failure. On error nothing is written to
/// `output`.
pub async fn build_index<B: IndexBackend>(
    ctx: &PipelineContext,
    source: &dyn DocumentSource,
    pool: &WorkerPool,
    backend: &B,
    output: &Path,
) -> Result<B::Handle> {
    let embedded = pipeline::run(ctx, source, pool).await?;

    let produced = RunStats::get(&ctx.stats().chunks_produced);
    if produced != embedded.len() as u64 {
        bail!(
            "Embedded {} chunks but {} were produced; refusing to build a partial index",
            embedded.len(),
            produced
        );
    }
    if embedded.is_empty() {
        warn!("no text was extracted; writing an empty index");
    }

    let entries = embedded.len() as u64;
    let index = backend
        .build_from_pairs(embedded)
        .context("Failed to build index")?;

    ctx.report(ProgressEvent::Saving {
        dir: output.display().to_string(),
        entries,
    });
    backend
        .save(&index, output)
        .with_context(|| format!("Failed to save index to {}", output.display()))?;

    Ok(index)
}

/// Run `pidx build`.
pub async fn run_build(mut config: Config, options: &BuildOptions) -> Result<RunReport> {
    options.apply(&mut config)?;

    let progress = options.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let ctx = PipelineContext::new(config.pipeline_settings(), progress.reporter())?;
    let source = FilesystemSource::new(&config.source)?;
    let output = config.index.output_directory.clone();

    if options.dry_run {
        let chunks = pipeline::extract_only(&ctx, &source).await?;
        let report = ctx.teardown();
        if progress == ProgressMode::Json {
            emit_summary(&report);
        }
        println!("build (dry-run)");
        print_extraction(&report);
        println!("  chunks: {}", chunks.len());
        return Ok(report);
    }

    let loader = create_loader(&config.embedding)?;
    let model = loader.model_name().to_string();
    let dims = loader.dims();
    let pool = WorkerPool::start(&ctx, loader).await?;

    let backend = FlatIndexBackend::new(model.clone(), dims);
    let result = build_index(&ctx, &source, &pool, &backend, &output).await;
    pool.shutdown().await;
    result?;

    let report = ctx.teardown();
    if progress == ProgressMode::Json {
        emit_summary(&report);
    }
    info!(
        output = %output.display(),
        chunks = report.chunks_embedded,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "build complete"
    );

    println!("build {}", output.display());
    print_extraction(&report);
    println!("  chunks: {}", report.chunks_produced);
    println!("  batches: {}", report.batches_embedded);
    println!("  embedded: {}", report.chunks_embedded);
    println!("  model: {} ({} dims)", model, dims);
    println!("  elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!("ok");
    Ok(report)
}

fn print_extraction(report: &RunReport) {
    println!("  documents: {}", report.documents_seen);
    println!("  documents skipped: {}", report.documents_skipped);
    println!("  documents empty: {}", report.documents_empty);
    println!("  pages: {}", report.pages_extracted);
    println!("  pages skipped: {}", report.pages_skipped);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let mut config = Config::default();
        let options = BuildOptions {
            input: Some(PathBuf::from("/in")),
            output: Some(PathBuf::from("/out")),
            pool_size: Some(2),
            batch_size: Some(16),
            ..Default::default()
        };
        options.apply(&mut config).unwrap();
        assert_eq!(config.source.input_directory, PathBuf::from("/in"));
        assert_eq!(config.index.output_directory, PathBuf::from("/out"));
        assert_eq!(config.embedding.pool_size, 2);
        assert_eq!(config.embedding.batch_size, 16);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = Config::default();
        let options = BuildOptions {
            pool_size: Some(0),
            ..Default::default()
        };
        assert!(options.apply(&mut config).is_err());
    }
}
