//! On-disk persistence for [`FlatIndex`].
//!
//! An index directory holds three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `manifest.json` | model, dimension, entry count, SHA-256 of `vectors.bin` |
//! | `entries.jsonl` | one [`IndexEntry`] per line (id, text, origin) |
//! | `vectors.bin` | row-major little-endian `f32`, one row per entry, same order |
//!
//! Saving writes a complete copy into a hidden staging directory beside the
//! target and renames it into place, so a reader never sees a partial index
//! and an interrupted run leaves any previous index untouched.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pdf_index_core::embedding::{blob_to_vec, vec_to_blob};
use pdf_index_core::index::flat::FlatIndex;
use pdf_index_core::index::{IndexBackend, IndexEntry, IndexError};
use pdf_index_core::models::EmbeddedChunk;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENTRIES_FILE: &str = "entries.jsonl";
pub const VECTORS_FILE: &str = "vectors.bin";

const FORMAT_VERSION: u32 = 1;

/// Metadata describing a persisted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    /// Random id assigned at save time.
    pub index_id: String,
    pub model: String,
    pub dims: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of `vectors.bin`.
    pub vectors_sha256: String,
}

/// The built-in [`IndexBackend`]: an exact [`FlatIndex`] saved as plain files.
pub struct FlatIndexBackend {
    model: String,
    dims: usize,
}

impl FlatIndexBackend {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }
}

impl IndexBackend for FlatIndexBackend {
    type Handle = FlatIndex;

    fn build_from_pairs(&self, pairs: Vec<EmbeddedChunk>) -> Result<FlatIndex, IndexError> {
        FlatIndex::build(self.model.clone(), self.dims, pairs)
    }

    fn save(&self, index: &FlatIndex, dir: &Path) -> Result<(), IndexError> {
        save_index(index, dir).map(|_| ())
    }
}

/// Persist `index` to `dir`, atomically replacing any existing index there.
pub fn save_index(index: &FlatIndex, dir: &Path) -> Result<Manifest, IndexError> {
    let name = dir
        .file_name()
        .ok_or_else(|| {
            IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("index directory has no name: {}", dir.display()),
            ))
        })?
        .to_string_lossy()
        .to_string();
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let staging = parent.join(format!(".{}.staging-{}", name, Uuid::new_v4()));
    let manifest = match write_files(index, &staging) {
        Ok(manifest) => manifest,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };

    if dir.exists() {
        let backup = parent.join(format!(".{}.old-{}", name, Uuid::new_v4()));
        fs::rename(dir, &backup)?;
        if let Err(e) = fs::rename(&staging, dir) {
            let _ = fs::rename(&backup, dir);
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        if let Err(e) = fs::remove_dir_all(&backup) {
            warn!(path = %backup.display(), error = %e, "failed to remove previous index");
        }
    } else if let Err(e) = fs::rename(&staging, dir) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }

    info!(
        dir = %dir.display(),
        entries = manifest.count,
        dims = manifest.dims,
        "index saved"
    );
    Ok(manifest)
}

fn write_files(index: &FlatIndex, staging: &Path) -> Result<Manifest, IndexError> {
    fs::create_dir_all(staging)?;

    let mut entries = BufWriter::new(File::create(staging.join(ENTRIES_FILE))?);
    let mut vectors = BufWriter::new(File::create(staging.join(VECTORS_FILE))?);
    let mut hasher = Sha256::new();
    for entry in index.entries() {
        serde_json::to_writer(&mut entries, entry)?;
        entries.write_all(b"\n")?;

        let row = vec_to_blob(&entry.vector);
        hasher.update(&row);
        vectors.write_all(&row)?;
    }
    finish(entries)?;
    finish(vectors)?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        index_id: Uuid::new_v4().to_string(),
        model: index.model().to_string(),
        dims: index.dims(),
        count: index.len(),
        created_at: Utc::now(),
        vectors_sha256: format!("{:x}", hasher.finalize()),
    };
    let mut file = BufWriter::new(File::create(staging.join(MANIFEST_FILE))?);
    serde_json::to_writer_pretty(&mut file, &manifest)?;
    file.write_all(b"\n")?;
    finish(file)?;

    debug!(staging = %staging.display(), "index files written");
    Ok(manifest)
}

fn finish(writer: BufWriter<File>) -> Result<(), IndexError> {
    let file = writer.into_inner().map_err(|e| IndexError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Read only the manifest of the index in `dir`.
pub fn read_manifest(dir: &Path) -> Result<Manifest, IndexError> {
    let file = File::open(dir.join(MANIFEST_FILE))?;
    let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!(
            "unsupported format version {}",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Load and verify the index in `dir`.
///
/// # Errors
///
/// [`IndexError::Corrupt`] if the entry count, vector file size, or vector
/// checksum disagree with the manifest.
pub fn load_index(dir: &Path) -> Result<(Manifest, FlatIndex), IndexError> {
    let manifest = read_manifest(dir)?;

    let blob = fs::read(dir.join(VECTORS_FILE))?;
    let expected_len = manifest.count * manifest.dims * 4;
    if blob.len() != expected_len {
        return Err(IndexError::Corrupt(format!(
            "{} is {} bytes, expected {}",
            VECTORS_FILE,
            blob.len(),
            expected_len
        )));
    }
    let digest = format!("{:x}", Sha256::digest(&blob));
    if digest != manifest.vectors_sha256 {
        return Err(IndexError::Corrupt(format!(
            "{} checksum mismatch",
            VECTORS_FILE
        )));
    }

    let reader = BufReader::new(File::open(dir.join(ENTRIES_FILE))?);
    let mut entries = Vec::with_capacity(manifest.count);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: IndexEntry = serde_json::from_str(&line)?;
        entries.push(entry);
    }
    if entries.len() != manifest.count {
        return Err(IndexError::Corrupt(format!(
            "{} has {} entries, manifest says {}",
            ENTRIES_FILE,
            entries.len(),
            manifest.count
        )));
    }

    let row_bytes = manifest.dims * 4;
    if row_bytes > 0 {
        for (entry, row) in entries.iter_mut().zip(blob.chunks_exact(row_bytes)) {
            entry.vector = blob_to_vec(row);
        }
    }

    let index = FlatIndex::from_entries(manifest.model.clone(), manifest.dims, entries)?;
    Ok((manifest, index))
}
