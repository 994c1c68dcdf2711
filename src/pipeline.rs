//! Streaming pipeline coordinator.
//!
//! Composes the stages of a build and moves records between them with
//! bounded memory:
//!
//! ```text
//! DocumentSource ──fetch──▶ ExtractStage.then(SplitStage)   (spawn_blocking,
//!                               │                            ≤ extract_concurrency docs)
//!                               ▼
//!                           Batcher ──▶ channel(pool_size) ──▶ dispatcher
//!                                                              (≤ pool_size batches in flight)
//!                                                                  │
//!                                                          WorkerPool ──▶ Vec<EmbeddedChunk>
//! ```
//!
//! The producer and the dispatcher run concurrently; the first fatal error
//! from either cancels the other. Results are collected in completion order.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pdf_index_core::embedding::EmbedError;
use pdf_index_core::models::{Chunk, Document, EmbeddedChunk};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::SplitStage;
use crate::context::{PipelineContext, RunStats};
use crate::extract::ExtractStage;
use crate::pool::{PoolHandle, WorkerPool};
use crate::progress::ProgressEvent;
use crate::sources::DocumentSource;

/// A one-to-many stage: each input yields zero or more outputs.
pub trait FlatMap: Send + Sync {
    type In;
    type Out;

    fn apply(&self, input: Self::In) -> Vec<Self::Out>;

    /// Feed every output of `self` through `next`, concatenating the results.
    fn then<B>(self, next: B) -> Chain<Self, B>
    where
        Self: Sized,
        B: FlatMap<In = Self::Out>,
    {
        Chain {
            first: self,
            second: next,
        }
    }
}

/// Two stages run back to back. Built with [`FlatMap::then`].
pub struct Chain<A, B> {
    first: A,
    second: B,
}

impl<A, B> FlatMap for Chain<A, B>
where
    A: FlatMap,
    B: FlatMap<In = A::Out>,
{
    type In = A::In;
    type Out = B::Out;

    fn apply(&self, input: A::In) -> Vec<B::Out> {
        self.first
            .apply(input)
            .into_iter()
            .flat_map(|item| self.second.apply(item))
            .collect()
    }
}

/// Where the dispatcher sends batches. [`PoolHandle`] is the production
/// implementation.
#[async_trait]
pub trait BatchEmbedder: Clone + Send + Sync + 'static {
    async fn embed_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, EmbedError>;
}

#[async_trait]
impl BatchEmbedder for PoolHandle {
    async fn embed_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, EmbedError> {
        PoolHandle::embed_batch(self, chunks).await
    }
}

/// Groups single records into batches of a fixed size.
pub struct Batcher<T> {
    size: usize,
    buffer: Vec<T>,
}

impl<T> Batcher<T> {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "batch size must be > 0");
        Self {
            size,
            buffer: Vec::with_capacity(size),
        }
    }

    /// Add a record; returns a full batch once `size` records are buffered.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.buffer.push(item);
        if self.buffer.len() >= self.size {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    /// Take whatever is buffered, if anything.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Run every document of `source` through extraction, splitting and
/// embedding.
///
/// Returns one [`EmbeddedChunk`] per chunk produced, in no particular order.
/// Unreadable documents and pages are skipped and counted in the context's
/// statistics; any embedding failure aborts the run.
pub async fn run(
    ctx: &PipelineContext,
    source: &dyn DocumentSource,
    pool: &WorkerPool,
) -> Result<Vec<EmbeddedChunk>> {
    let (tx, rx) = mpsc::channel::<Vec<Chunk>>(ctx.settings().pool_size);
    let handle = pool.handle();

    let producer = async move {
        let mut batcher = Batcher::new(ctx.settings().embedding_batch_size);
        let to_batches = |chunks: Vec<Chunk>| -> Vec<Vec<Chunk>> {
            chunks.into_iter().filter_map(|c| batcher.push(c)).collect()
        };
        produce(ctx, source, to_batches, &tx).await?;
        if let Some(last) = batcher.flush() {
            send_batch(&tx, last).await?;
        }
        Ok::<_, anyhow::Error>(())
    };

    let (_, embedded) = tokio::try_join!(producer, dispatch(ctx, handle, rx))?;
    info!(chunks = embedded.len(), "pipeline drained");
    Ok(embedded)
}

/// Extract and split every document without embedding.
///
/// Used by `pidx build --dry-run`; updates the same run statistics as
/// [`run`].
pub async fn extract_only(ctx: &PipelineContext, source: &dyn DocumentSource) -> Result<Vec<Chunk>> {
    let (tx, mut rx) = mpsc::channel::<Vec<Chunk>>(1);
    let producer = async move { produce(ctx, source, |chunks| vec![chunks], &tx).await };
    let collector = async move {
        let mut all = Vec::new();
        while let Some(chunks) = rx.recv().await {
            all.extend(chunks);
        }
        Ok::<_, anyhow::Error>(all)
    };
    let (_, chunks) = tokio::try_join!(producer, collector)?;
    Ok(chunks)
}

/// Batch and embed chunks the caller already holds.
///
/// The chunks are counted as produced in the context's statistics.
pub async fn embed_all(
    ctx: &PipelineContext,
    pool: &WorkerPool,
    chunks: Vec<Chunk>,
) -> Result<Vec<EmbeddedChunk>> {
    embed_chunks(ctx, pool.handle(), chunks).await
}

async fn embed_chunks<E: BatchEmbedder>(
    ctx: &PipelineContext,
    embedder: E,
    chunks: Vec<Chunk>,
) -> Result<Vec<EmbeddedChunk>> {
    RunStats::add(&ctx.stats().chunks_produced, chunks.len() as u64);

    let (tx, rx) = mpsc::channel::<Vec<Chunk>>(ctx.settings().pool_size);
    let producer = async move {
        let mut batcher = Batcher::new(ctx.settings().embedding_batch_size);
        for chunk in chunks {
            if let Some(batch) = batcher.push(chunk) {
                send_batch(&tx, batch).await?;
            }
        }
        if let Some(last) = batcher.flush() {
            send_batch(&tx, last).await?;
        }
        Ok::<_, anyhow::Error>(())
    };

    let (_, embedded) = tokio::try_join!(producer, dispatch(ctx, embedder, rx))?;
    Ok(embedded)
}

async fn send_batch(tx: &mpsc::Sender<Vec<Chunk>>, batch: Vec<Chunk>) -> Result<()> {
    tx.send(batch)
        .await
        .map_err(|_| anyhow::anyhow!("Embedding dispatcher stopped"))
}

/// Fetch, extract and split every document, handing each document's chunks
/// to `emit` and sending whatever batches it returns.
async fn produce<F>(
    ctx: &PipelineContext,
    source: &dyn DocumentSource,
    mut emit: F,
    tx: &mpsc::Sender<Vec<Chunk>>,
) -> Result<()>
where
    F: FnMut(Vec<Chunk>) -> Vec<Vec<Chunk>>,
{
    ctx.report(ProgressEvent::Discovering {
        source: source.name(),
    });
    let refs = source
        .list()
        .await
        .with_context(|| format!("Failed to list documents from {}", source.name()))?;
    let total = refs.len() as u64;
    info!(source = %source.name(), documents = total, "discovered documents");

    let stage = Arc::new(ExtractStage::new(ctx).then(SplitStage::new(ctx)));
    let limit = ctx.settings().extract_concurrency;
    let stats = ctx.stats();
    let mut tasks: JoinSet<Vec<Chunk>> = JoinSet::new();
    let mut done = 0u64;

    for doc_ref in refs {
        RunStats::add(&stats.documents_seen, 1);
        let document: Document = match source.fetch(&doc_ref).await {
            Ok(document) => document,
            Err(e) => {
                warn!(source_id = %doc_ref.source_id, error = %format!("{:#}", e), "skipping unfetchable document");
                RunStats::add(&stats.documents_skipped, 1);
                done += 1;
                continue;
            }
        };

        while tasks.len() >= limit {
            if let Some(joined) = tasks.join_next().await {
                let chunks = joined.context("Extraction task failed")?;
                done += 1;
                ctx.report(ProgressEvent::Extracting { n: done, total });
                for batch in emit(chunks) {
                    send_batch(tx, batch).await?;
                }
            }
        }

        let stage = Arc::clone(&stage);
        tasks.spawn_blocking(move || stage.apply(document));
    }

    while let Some(joined) = tasks.join_next().await {
        let chunks = joined.context("Extraction task failed")?;
        done += 1;
        ctx.report(ProgressEvent::Extracting { n: done, total });
        for batch in emit(chunks) {
            send_batch(tx, batch).await?;
        }
    }

    debug!(documents = done, "producer finished");
    Ok(())
}

/// Send batches to the pool, at most `pool_size` at a time, and collect the
/// results.
async fn dispatch<E: BatchEmbedder>(
    ctx: &PipelineContext,
    embedder: E,
    mut rx: mpsc::Receiver<Vec<Chunk>>,
) -> Result<Vec<EmbeddedChunk>> {
    let limit = ctx.settings().pool_size;
    let stats = ctx.stats();
    let mut in_flight = JoinSet::new();
    let mut embedded = Vec::new();
    let mut open = true;

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                let batch: Vec<EmbeddedChunk> = joined.context("Embedding task failed")??;
                RunStats::add(&stats.batches_embedded, 1);
                RunStats::add(&stats.chunks_embedded, batch.len() as u64);
                ctx.report(ProgressEvent::Embedding {
                    batches: RunStats::get(&stats.batches_embedded),
                    chunks: RunStats::get(&stats.chunks_embedded),
                });
                embedded.extend(batch);
            }
            next = rx.recv(), if open && in_flight.len() < limit => {
                match next {
                    Some(batch) => {
                        debug!(size = batch.len(), "dispatching batch");
                        let embedder = embedder.clone();
                        in_flight.spawn(async move {
                            embedder
                                .embed_batch(batch)
                                .await
                                .context("Embedding batch failed")
                        });
                    }
                    None => open = false,
                }
            }
            else => break,
        }
    }

    Ok(embedded)
}
