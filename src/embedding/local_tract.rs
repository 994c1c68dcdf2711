//! Tract-based local embedding backend (fallback for musl and Intel Mac).
//!
//! Pure-Rust path: loads the ONNX model with tract-onnx and tokenizes with
//! the tokenizers crate. Model files are downloaded once into
//! `~/.cache/pdf-index/models` and reused by every worker.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use pdf_index_core::embedding::{EmbedError, EmbeddingModel, ModelLoader};
use tract_onnx::prelude::*;

const DEFAULT_MAX_LEN: usize = 256;

/// Model manifest: name -> (Hugging Face repo, onnx path in repo, tokenizer path in repo).
fn model_manifest(model_name: &str) -> Result<(&'static str, &'static str, &'static str)> {
    match model_name {
        "all-minilm-l6-v2" => Ok((
            "sentence-transformers/all-MiniLM-L6-v2",
            "onnx/model.onnx",
            "tokenizer.json",
        )),
        _ => bail!(
            "Tract backend supports only all-minilm-l6-v2 for now. Requested: '{}'",
            model_name
        ),
    }
}

fn cache_dir() -> Result<PathBuf, EmbedError> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("pdf-index")
        .join("models");
    std::fs::create_dir_all(&dir).map_err(|e| EmbedError::Load(format!("Create cache dir: {}", e)))?;
    Ok(dir)
}

fn download_to_cache(repo: &str, path: &str, cache_path: &Path) -> Result<(), EmbedError> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo,
        path.replace(' ', "%20")
    );
    let bytes = reqwest::blocking::get(&url)
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.bytes())
        .map_err(|e| EmbedError::Load(format!("Download {}: {}", url, e)))?;
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| EmbedError::Load(format!("Create cache parent: {}", e)))?;
    }
    // Concurrent workers may race here; write-then-rename keeps the cache whole.
    let partial = cache_path.with_extension(format!("part-{}", uuid::Uuid::new_v4()));
    std::fs::write(&partial, &bytes)
        .and_then(|_| std::fs::rename(&partial, cache_path))
        .map_err(|e| EmbedError::Load(format!("Write cache: {}", e)))?;
    Ok(())
}

type Runner = Box<dyn FnMut(TVec<TValue>) -> TractResult<TVec<TValue>> + Send>;

/// Loads an optimized tract plan and tokenizer per worker.
pub struct TractLoader {
    model_name: String,
    dims: usize,
    repo: &'static str,
    onnx_rel: &'static str,
    tokenizer_rel: &'static str,
}

impl TractLoader {
    pub fn new(model_name: String, dims: usize) -> Result<Self> {
        let (repo, onnx_rel, tokenizer_rel) = model_manifest(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            repo,
            onnx_rel,
            tokenizer_rel,
        })
    }

    /// Ensure model and tokenizer are in cache; return (onnx path, tokenizer path).
    fn ensure_cached(&self) -> Result<(PathBuf, PathBuf), EmbedError> {
        let model_dir = cache_dir()?.join(&self.model_name);
        let onnx_path = model_dir.join(self.onnx_rel);
        let tokenizer_path = model_dir.join(self.tokenizer_rel);
        download_to_cache(self.repo, self.onnx_rel, &onnx_path)?;
        download_to_cache(self.repo, self.tokenizer_rel, &tokenizer_path)?;
        Ok((onnx_path, tokenizer_path))
    }
}

impl ModelLoader for TractLoader {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn load(&self, _worker_id: usize) -> Result<Box<dyn EmbeddingModel>, EmbedError> {
        let (onnx_path, tokenizer_path) = self.ensure_cached()?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::Load(format!("Load tokenizer: {}", e)))?;

        let plan = tract_onnx::onnx()
            .model_for_path(onnx_path)
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| EmbedError::Load(format!("Build tract runnable: {}", e)))?;
        let runner: Runner = Box::new(move |inputs| plan.run(inputs));

        Ok(Box::new(TractModel {
            model_name: self.model_name.clone(),
            dims: self.dims,
            tokenizer,
            runner,
        }))
    }
}

/// A loaded tract model with its tokenizer.
pub struct TractModel {
    model_name: String,
    dims: usize,
    tokenizer: tokenizers::Tokenizer,
    runner: Runner,
}

impl TractModel {
    fn encode_batch(&mut self, batch: &[String], out: &mut Vec<Vec<f32>>) -> Result<()> {
        let encodings = batch
            .iter()
            .map(|s| {
                self.tokenizer
                    .encode(s.as_str(), true)
                    .map_err(|e| anyhow!("Tokenize: {}", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(1)
            .clamp(1, DEFAULT_MAX_LEN);

        let rows = encodings.len();
        let mut input_ids = vec![0i64; rows * max_len];
        let mut attention_mask = vec![0i64; rows * max_len];
        for (i, enc) in encodings.iter().enumerate() {
            for (j, &id) in enc.get_ids().iter().take(max_len).enumerate() {
                input_ids[i * max_len + j] = id as i64;
                attention_mask[i * max_len + j] = 1;
            }
        }

        let input_ids: Tensor = ndarray::Array2::from_shape_vec((rows, max_len), input_ids)?.into();
        let attention_mask: Tensor =
            ndarray::Array2::from_shape_vec((rows, max_len), attention_mask)?.into();
        let result = (self.runner)(tvec!(input_ids.into(), attention_mask.into()))?;

        let output = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No output tensor"))?;
        let view = output.to_array_view::<f32>()?;

        // [batch, dims] is already pooled; [batch, seq_len, dims] is mean-pooled
        // over the unmasked tokens.
        let shape = view.shape();
        match shape.len() {
            2 => {
                for i in 0..shape[0] {
                    let row = view.slice(ndarray::s![i, ..]);
                    out.push(normalize_l2(row.iter().copied().collect()));
                }
            }
            3 => {
                let seq_len = shape[1];
                for (i, enc) in encodings.iter().enumerate() {
                    let valid_len = enc.get_ids().len().min(seq_len).min(max_len);
                    let mut sum = vec![0f32; self.dims];
                    for j in 0..valid_len {
                        for (k, &v) in view.slice(ndarray::s![i, j, ..]).iter().enumerate() {
                            if k < self.dims {
                                sum[k] += v;
                            }
                        }
                    }
                    if valid_len > 0 {
                        for x in &mut sum {
                            *x /= valid_len as f32;
                        }
                    }
                    out.push(normalize_l2(sum));
                }
            }
            _ => bail!("Unexpected output shape: {:?}", shape),
        }
        Ok(())
    }
}

impl EmbeddingModel for TractModel {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode(&mut self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            self.encode_batch(batch, &mut embeddings)
                .map_err(|e| EmbedError::Inference(e.to_string()))?;
        }
        Ok(embeddings)
    }
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
