//! TOML configuration parsing and validation.
//!
//! Every section and key has a default, so an empty file (or no file at all,
//! via [`Config::default`]) describes the reference run: `./documents` in,
//! `./faiss_index` out, 1000/100 character chunks, batches of 100 on a pool
//! of 20 workers.
//!
//! ```toml
//! [source]
//! input_directory = "./documents"
//! extensions = ["pdf"]
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 100
//!
//! [embedding]
//! provider = "local"
//! model = "bge-base-en-v1.5"
//! batch_size = 100
//! pool_size = 20
//!
//! [index]
//! output_directory = "./faiss_index"
//! ```

use anyhow::{bail, Context, Result};
use pdf_index_core::chunk::{SplitterConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::context::PipelineSettings;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_input_directory")]
    pub input_directory: PathBuf,
    /// File extensions to ingest, without the dot. Matched case-insensitively.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input_directory: default_input_directory(),
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_input_directory() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Record source document, page and position on every chunk.
    #[serde(default = "default_true")]
    pub track_origin: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            track_origin: true,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model", alias = "model_identifier")]
    pub model: String,
    /// Overrides the built-in dimension table; required for models it does
    /// not list.
    #[serde(default)]
    pub dims: Option<usize>,
    /// Chunks per batch handed to a worker.
    #[serde(default = "default_batch_size", alias = "embedding_batch_size")]
    pub batch_size: usize,
    /// Batch size passed to the model's own encode call. Defaults to
    /// `batch_size`.
    #[serde(default)]
    pub encode_batch_size: Option<usize>,
    /// Number of long-lived workers, each holding its own loaded model.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default)]
    pub show_download_progress: bool,
    /// Where each worker runs its model.
    #[serde(default)]
    pub device: Device,
    /// Accelerators to spread workers over when `device = "cuda"`. Worker
    /// `i` runs on device `i % gpu_count`.
    #[serde(default = "default_gpu_count")]
    pub gpu_count: usize,
}

/// Compute device for embedding workers.
///
/// `cuda` needs a build with the `cuda` feature; without it, or when ONNX
/// Runtime cannot register the CUDA provider, workers run on the CPU.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: None,
            batch_size: default_batch_size(),
            encode_batch_size: None,
            pool_size: default_pool_size(),
            show_download_progress: false,
            device: Device::Cpu,
            gpu_count: default_gpu_count(),
        }
    }
}

impl EmbeddingConfig {
    pub fn encode_batch_size(&self) -> usize {
        self.encode_batch_size.unwrap_or(self.batch_size)
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_model() -> String {
    "bge-base-en-v1.5".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_pool_size() -> usize {
    20
}
fn default_gpu_count() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_output_directory", alias = "index_output_directory")]
    pub output_directory: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            output_directory: default_output_directory(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("./faiss_index")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    /// Documents extracted and split concurrently. `None` uses the number of
    /// available CPUs.
    #[serde(default)]
    pub extract_concurrency: Option<usize>,
}

impl Config {
    /// Settings for a [`PipelineContext`](crate::context::PipelineContext).
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let extract_concurrency = self.pipeline.extract_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        PipelineSettings {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
            track_origin: self.chunking.track_origin,
            embedding_batch_size: self.embedding.batch_size,
            encode_batch_size: self.embedding.encode_batch_size(),
            pool_size: self.embedding.pool_size,
            extract_concurrency,
        }
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        SplitterConfig::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
            .context("Invalid [chunking] settings")?;

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.encode_batch_size() == 0 {
            bail!("embedding.encode_batch_size must be > 0");
        }
        if self.embedding.pool_size == 0 {
            bail!("embedding.pool_size must be > 0");
        }
        if self.embedding.gpu_count == 0 {
            bail!("embedding.gpu_count must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        if self.pipeline.extract_concurrency == Some(0) {
            bail!("pipeline.extract_concurrency must be > 0");
        }
        if self.source.extensions.is_empty() {
            bail!("source.extensions must list at least one extension");
        }

        match self.embedding.provider.as_str() {
            "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local.",
                other
            ),
        }

        Ok(())
    }
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Commented starter configuration written by `pidx init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# pdf-index configuration

[source]
input_directory = "./documents"
extensions = ["pdf"]
exclude_globs = []
follow_symlinks = false

[chunking]
chunk_size = 1000
chunk_overlap = 100
# Set to false to drop source/page back-references from chunks.
track_origin = true

[embedding]
provider = "local"
model = "bge-base-en-v1.5"
batch_size = 100
pool_size = 20
# "cpu" or "cuda" (needs the `cuda` feature; falls back to CPU otherwise).
device = "cpu"
# gpu_count = 1

[index]
output_directory = "./faiss_index"

[pipeline]
# extract_concurrency = 8
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_file_uses_reference_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert!(config.chunking.track_origin);
        assert_eq!(config.embedding.batch_size, 100);
        assert_eq!(config.embedding.pool_size, 20);
        assert_eq!(config.embedding.encode_batch_size(), 100);
        assert_eq!(config.source.extensions, vec!["pdf".to_string()]);
        assert_eq!(config.index.output_directory, PathBuf::from("./faiss_index"));
    }

    #[test]
    fn starter_config_is_valid() {
        let config = parse(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.embedding.model, "bge-base-en-v1.5");
    }

    #[test]
    fn accepts_flat_option_aliases() {
        let config = parse(
            r#"
            [embedding]
            model_identifier = "all-minilm-l6-v2"
            embedding_batch_size = 32

            [index]
            index_output_directory = "/tmp/idx"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.model, "all-minilm-l6-v2");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.index.output_directory, PathBuf::from("/tmp/idx"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = parse("[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(format!("{:#}", err).contains("chunk_overlap"));
    }

    #[test]
    fn rejects_zero_pool_and_batch() {
        assert!(parse("[embedding]\npool_size = 0\n").is_err());
        assert!(parse("[embedding]\nbatch_size = 0\n").is_err());
        assert!(parse("[pipeline]\nextract_concurrency = 0\n").is_err());
    }

    #[test]
    fn parses_device_settings() {
        let config = parse("").unwrap();
        assert_eq!(config.embedding.device, Device::Cpu);
        assert_eq!(config.embedding.gpu_count, 1);

        let config = parse("[embedding]\ndevice = \"cuda\"\ngpu_count = 4\n").unwrap();
        assert_eq!(config.embedding.device, Device::Cuda);
        assert_eq!(config.embedding.gpu_count, 4);

        assert!(parse("[embedding]\ndevice = \"tpu\"\n").is_err());
        assert!(parse("[embedding]\ngpu_count = 0\n").is_err());
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn pipeline_settings_follow_config() {
        let config = parse("[embedding]\npool_size = 3\nbatch_size = 7\n[pipeline]\nextract_concurrency = 2\n").unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(settings.pool_size, 3);
        assert_eq!(settings.embedding_batch_size, 7);
        assert_eq!(settings.encode_batch_size, 7);
        assert_eq!(settings.extract_concurrency, 2);
    }
}
