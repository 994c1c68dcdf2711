//! Fixed-size pool of embedding workers.
//!
//! Each worker is a dedicated OS thread that loads its own model once via
//! [`ModelLoader::load`] and keeps it for the whole run; a loaded model is
//! never shared or locked. Workers pull batches from one bounded queue,
//! encode a batch to completion, and answer on the job's oneshot channel.
//!
//! ```text
//!                    ┌──────────── bounded queue (pool_size) ────────────┐
//! PoolHandle::embed ─┤                                                   │
//!                    └──▶ worker 0 (model) ── worker 1 (model) ── … ─────┘
//!                              │ reply (oneshot)
//! ```
//!
//! Worker 0 loads first so a cold model cache is filled exactly once; the
//! remaining workers then load concurrently. [`WorkerPool::start`] returns
//! only when every worker is ready.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context, Result};
use pdf_index_core::embedding::{EmbedError, EmbeddingModel, ModelLoader};
use pdf_index_core::models::{Chunk, EmbeddedChunk};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::context::PipelineContext;

type Reply = Result<Vec<Vec<f32>>, EmbedError>;
type Ready = Result<(String, usize), EmbedError>;

struct Job {
    texts: Vec<String>,
    reply: oneshot::Sender<Reply>,
}

/// Cloneable submission side of a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolHandle {
    queue: mpsc::Sender<Job>,
}

impl PoolHandle {
    /// Embed one batch on whichever worker is free.
    ///
    /// Returns exactly one [`EmbeddedChunk`] per input chunk. Waits while the
    /// queue is full.
    ///
    /// # Errors
    ///
    /// Any [`EmbedError`]: a failed or panicking encode, a wrong number of
    /// vectors, a vector of the wrong dimension, or a closed pool.
    pub async fn embed_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, EmbedError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let (reply, response) = oneshot::channel();
        self.queue
            .send(Job { texts, reply })
            .await
            .map_err(|_| EmbedError::PoolClosed)?;
        let vectors = response.await.map_err(|_| EmbedError::PoolClosed)??;

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::from_chunk(chunk, vector))
            .collect())
    }
}

/// A running pool of model-holding workers.
///
/// Dropping the pool closes its queue; workers exit once every
/// [`PoolHandle`] is gone. Use [`shutdown`](WorkerPool::shutdown) to also
/// wait for the threads.
pub struct WorkerPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
    model_name: String,
    dims: usize,
}

impl WorkerPool {
    /// Spawn `pool_size` workers and wait until each has loaded its model.
    ///
    /// # Errors
    ///
    /// Fails, after stopping any workers already started, if a thread cannot
    /// be spawned, a model fails to load, or a worker's model reports a
    /// different name or dimension than `loader`.
    pub async fn start(ctx: &PipelineContext, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        let size = ctx.settings().pool_size;
        let batch_size = ctx.settings().encode_batch_size;
        let (queue, rx) = mpsc::channel::<Job>(size);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = Vec::with_capacity(size);

        info!(
            workers = size,
            model = loader.model_name(),
            "starting embedding pool"
        );

        let mut pending = Vec::with_capacity(size);
        for id in 0..size {
            match spawn_worker(id, &loader, &rx, batch_size) {
                Ok((thread, ready)) => {
                    workers.push(thread);
                    pending.push((id, ready));
                }
                Err(e) => {
                    stop_workers(queue, workers).await;
                    return Err(e);
                }
            }

            // The first model load may download weights; let it finish alone.
            if id == 0 {
                let (id, ready) = pending.remove(0);
                if let Err(e) = await_ready(id, ready, loader.as_ref()).await {
                    stop_workers(queue, workers).await;
                    return Err(e);
                }
            }
        }

        for (id, ready) in pending {
            if let Err(e) = await_ready(id, ready, loader.as_ref()).await {
                stop_workers(queue, workers).await;
                return Err(e);
            }
        }

        info!(
            workers = size,
            model = loader.model_name(),
            dims = loader.dims(),
            "embedding pool ready"
        );

        Ok(Self {
            handle: PoolHandle { queue },
            workers,
            model_name: loader.model_name().to_string(),
            dims: loader.dims(),
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Embed one batch. See [`PoolHandle::embed_batch`].
    pub async fn embed_batch(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddedChunk>, EmbedError> {
        self.handle.embed_batch(chunks).await
    }

    /// Close the queue and join every worker thread.
    ///
    /// Handles obtained from [`handle`](WorkerPool::handle) must be dropped
    /// first, or this waits for them.
    pub async fn shutdown(self) {
        let WorkerPool { handle, workers, .. } = self;
        stop_workers(handle.queue, workers).await;
        debug!("embedding pool shut down");
    }
}

fn spawn_worker(
    id: usize,
    loader: &Arc<dyn ModelLoader>,
    rx: &Arc<Mutex<mpsc::Receiver<Job>>>,
    batch_size: usize,
) -> Result<(JoinHandle<()>, oneshot::Receiver<Ready>)> {
    let (ready_tx, ready_rx) = oneshot::channel();
    let loader = Arc::clone(loader);
    let rx = Arc::clone(rx);
    let thread = std::thread::Builder::new()
        .name(format!("embed-worker-{}", id))
        .spawn(move || worker_loop(id, loader, rx, batch_size, ready_tx))
        .with_context(|| format!("Failed to spawn embedding worker {}", id))?;
    Ok((thread, ready_rx))
}

async fn await_ready(id: usize, ready: oneshot::Receiver<Ready>, loader: &dyn ModelLoader) -> Result<()> {
    let (model_name, dims) = ready
        .await
        .map_err(|_| anyhow!("Embedding worker {} exited while loading its model", id))?
        .with_context(|| format!("Embedding worker {} failed to load its model", id))?;

    if model_name != loader.model_name() || dims != loader.dims() {
        bail!(
            "Embedding worker {} loaded {} ({} dims), expected {} ({} dims)",
            id,
            model_name,
            dims,
            loader.model_name(),
            loader.dims()
        );
    }
    debug!(worker = id, "embedding worker ready");
    Ok(())
}

async fn stop_workers(queue: mpsc::Sender<Job>, workers: Vec<JoinHandle<()>>) {
    drop(queue);
    let joined = tokio::task::spawn_blocking(move || {
        workers
            .into_iter()
            .filter_map(|worker| worker.join().err())
            .count()
    })
    .await;
    match joined {
        Ok(0) => {}
        Ok(panicked) => warn!(panicked, "embedding workers panicked"),
        Err(e) => warn!(error = %e, "failed to join embedding workers"),
    }
}

fn worker_loop(
    id: usize,
    loader: Arc<dyn ModelLoader>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    batch_size: usize,
    ready: oneshot::Sender<Ready>,
) {
    let mut model = match catch_unwind(AssertUnwindSafe(|| loader.load(id))) {
        Ok(Ok(model)) => model,
        Ok(Err(e)) => {
            let _ = ready.send(Err(e));
            return;
        }
        Err(_) => {
            let _ = ready.send(Err(EmbedError::Load(format!(
                "worker {} panicked while loading",
                id
            ))));
            return;
        }
    };
    let dims = model.dims();
    if ready.send(Ok((model.model_name().to_string(), dims))).is_err() {
        return;
    }

    loop {
        let job = {
            let mut rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
            rx.blocking_recv()
        };
        let Some(job) = job else { break };

        let n = job.texts.len();
        match catch_unwind(AssertUnwindSafe(|| {
            encode_checked(model.as_mut(), &job.texts, batch_size, dims)
        })) {
            Ok(result) => {
                if let Err(e) = &result {
                    error!(worker = id, batch = n, error = %e, "embedding batch failed");
                } else {
                    debug!(worker = id, batch = n, "embedded batch");
                }
                let _ = job.reply.send(result);
            }
            Err(_) => {
                error!(worker = id, batch = n, "embedding worker panicked");
                let _ = job.reply.send(Err(EmbedError::WorkerLost(id)));
                break;
            }
        }
    }
    debug!(worker = id, "embedding worker stopped");
}

/// Encode and verify one vector of `dims` per input.
fn encode_checked(
    model: &mut dyn EmbeddingModel,
    texts: &[String],
    batch_size: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let vectors = model.encode(texts, batch_size)?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::Cardinality {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(EmbedError::Dimension {
            expected: dims,
            got: bad.len(),
        });
    }
    Ok(vectors)
}
