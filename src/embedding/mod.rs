//! Local embedding backends.
//!
//! Implements the [`ModelLoader`] / [`EmbeddingModel`] pair from
//! `pdf-index-core` for models that run in-process:
//! - **fastembed** (feature `local-embeddings-fastembed`, default): ONNX
//!   Runtime bundled by fastembed; weights downloaded from Hugging Face on
//!   first use and cached.
//! - **tract** (feature `local-embeddings-tract`): pure-Rust fallback for
//!   platforms without ORT binaries (musl, Intel Mac).
//!
//! A loader is shared by every pool worker; each worker calls
//! [`ModelLoader::load`] once and keeps the resulting model for the whole
//! run. After the first worker has populated the cache, no further network
//! calls are made.
//!
//! # Provider Selection
//!
//! Use [`create_loader`] to build the loader named by the configuration:
//!
//! ```rust,no_run
//! # use pdf_index::config::EmbeddingConfig;
//! # use pdf_index::embedding::create_loader;
//! let config = EmbeddingConfig::default(); // bge-base-en-v1.5
//! let loader = create_loader(&config).unwrap();
//! assert_eq!(loader.dims(), 768);
//! ```

#[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
mod local_tract;

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub use pdf_index_core::embedding::{EmbedError, EmbeddingModel, ModelLoader};

use crate::config::{Device, EmbeddingConfig};

/// Every model the local backends know, with its output dimension.
const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-minilm-l6-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
    ("bge-large-en-v1.5", 1024),
    ("nomic-embed-text-v1", 768),
    ("nomic-embed-text-v1.5", 768),
    ("multilingual-e5-small", 384),
    ("multilingual-e5-base", 768),
    ("multilingual-e5-large", 1024),
];

/// `(name, dims)` for every supported local model.
pub fn supported_models() -> &'static [(&'static str, usize)] {
    SUPPORTED_MODELS
}

/// Documented output dimension of a supported model.
pub fn model_dims(name: &str) -> Option<usize> {
    SUPPORTED_MODELS
        .iter()
        .find(|(model, _)| *model == name)
        .map(|(_, dims)| *dims)
}

fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, usize)> {
    let dims = match (config.dims, model_dims(&config.model)) {
        (Some(configured), Some(documented)) if configured != documented => bail!(
            "embedding.dims = {} does not match {} ({} dimensions)",
            configured,
            config.model,
            documented
        ),
        (Some(dims), _) | (None, Some(dims)) => dims,
        (None, None) => bail!(
            "Unknown local embedding model: '{}'. Supported models: {}",
            config.model,
            SUPPORTED_MODELS
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    Ok((config.model.clone(), dims))
}

/// Where one worker's model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Cpu,
    /// CUDA device ordinal.
    Cuda(usize),
}

/// Placement for worker `worker_id`: one accelerator per worker, assigned
/// round-robin over `gpu_count` devices.
pub fn placement(device: Device, gpu_count: usize, worker_id: usize) -> Placement {
    match device {
        Device::Cpu => Placement::Cpu,
        Device::Cuda => Placement::Cuda(worker_id % gpu_count.max(1)),
    }
}

// ============ fastembed ============

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbedError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(EmbedError::Load(format!(
            "fastembed has no model named '{}'",
            other
        ))),
    }
}

/// Loads one `fastembed::TextEmbedding` per worker.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct FastembedLoader {
    model_name: String,
    dims: usize,
    show_download_progress: bool,
    device: Device,
    gpu_count: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl FastembedLoader {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config)?;
        // Fail on an unknown name before any worker starts.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            show_download_progress: config.show_download_progress,
            device: effective_device(config.device),
            gpu_count: config.gpu_count,
        })
    }
}

/// The device fastembed workers will actually use in this build.
#[cfg(feature = "local-embeddings-fastembed")]
fn effective_device(requested: Device) -> Device {
    match requested {
        Device::Cuda if !cfg!(feature = "cuda") => {
            warn!("embedding.device = \"cuda\" but this build lacks the `cuda` feature; using CPU");
            Device::Cpu
        }
        other => other,
    }
}

#[cfg(all(feature = "local-embeddings-fastembed", feature = "cuda"))]
fn on_device(options: fastembed::InitOptions, placement: Placement) -> fastembed::InitOptions {
    use ort::execution_providers::CUDAExecutionProvider;

    match placement {
        Placement::Cpu => options,
        // ONNX Runtime falls back to the CPU provider if CUDA cannot be registered.
        Placement::Cuda(ordinal) => options.with_execution_providers(vec![
            CUDAExecutionProvider::default()
                .with_device_id(ordinal as i32)
                .build(),
        ]),
    }
}

#[cfg(all(feature = "local-embeddings-fastembed", not(feature = "cuda")))]
fn on_device(options: fastembed::InitOptions, _placement: Placement) -> fastembed::InitOptions {
    options
}

#[cfg(feature = "local-embeddings-fastembed")]
impl ModelLoader for FastembedLoader {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn load(&self, worker_id: usize) -> Result<Box<dyn EmbeddingModel>, EmbedError> {
        let model = config_to_fastembed_model(&self.model_name)?;
        // Only the first worker can be downloading; the rest hit the cache.
        let show_progress = self.show_download_progress && worker_id == 0;
        let placement = placement(self.device, self.gpu_count, worker_id);
        info!(worker = worker_id, ?placement, "loading embedding model");
        let options = on_device(
            fastembed::InitOptions::new(model).with_show_download_progress(show_progress),
            placement,
        );
        let inner = fastembed::TextEmbedding::try_new(options)
        .map_err(|e| {
            EmbedError::Load(format!(
                "Failed to initialize local embedding model {}: {}",
                self.model_name, e
            ))
        })?;

        Ok(Box::new(FastembedModel {
            model_name: self.model_name.clone(),
            dims: self.dims,
            inner,
        }))
    }
}

/// A loaded fastembed model.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct FastembedModel {
    model_name: String,
    dims: usize,
    inner: fastembed::TextEmbedding,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl EmbeddingModel for FastembedModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode(&mut self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.inner
            .embed(texts.to_vec(), Some(batch_size))
            .map_err(|e| EmbedError::Inference(format!("Local embedding failed: {}", e)))
    }
}

// ============ tract ============

#[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
pub use local_tract::{TractLoader, TractModel};

/// Create the [`ModelLoader`] for the configured provider and model.
///
/// # Supported Providers
///
/// | Config Value | Loader |
/// |-------------|--------|
/// | `"local"` | `FastembedLoader` or `TractLoader` (see features) |
///
/// # Errors
///
/// Returns an error for unknown providers or models, a `dims` override that
/// contradicts the model, or a build with no local backend compiled in.
pub fn create_loader(config: &EmbeddingConfig) -> Result<Arc<dyn ModelLoader>> {
    match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(FastembedLoader::new(config)?)),
        #[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
        "local" => {
            let (model_name, dims) = resolve_local_model(config)?;
            if config.device == Device::Cuda {
                warn!("the tract backend runs on CPU only; ignoring embedding.device = \"cuda\"");
            }
            Ok(Arc::new(TractLoader::new(model_name, dims)?))
        }
        #[cfg(not(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract")))]
        "local" => {
            resolve_local_model(config)?;
            bail!(
                "Local embedding provider requires one of: --features local-embeddings-fastembed, --features local-embeddings-tract"
            )
        }
        other => bail!("Unknown embedding provider: {}", other),
    }
}
