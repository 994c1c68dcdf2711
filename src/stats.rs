//! Index statistics.
//!
//! Provides a quick summary of a persisted index: model, dimension, entry
//! count, size on disk, and a per-document breakdown. Used by `pidx info` to
//! confirm a build produced what was expected.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use pdf_index_core::index::flat::FlatIndex;

use crate::index_store::{load_index, ENTRIES_FILE, MANIFEST_FILE, VECTORS_FILE};

/// Per-document chunk and page counts.
#[derive(Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub pages: usize,
    pub chunks: usize,
}

/// Group an index's entries by source document.
///
/// Entries without an origin are grouped under `"(untracked)"`.
pub fn source_breakdown(index: &FlatIndex) -> Vec<SourceStats> {
    let mut by_source: BTreeMap<String, (std::collections::BTreeSet<usize>, usize)> =
        BTreeMap::new();
    for entry in index.entries() {
        let (source, page) = match &entry.origin {
            Some(origin) => (origin.source_id.clone(), Some(origin.page_index)),
            None => ("(untracked)".to_string(), None),
        };
        let slot = by_source.entry(source).or_default();
        if let Some(page) = page {
            slot.0.insert(page);
        }
        slot.1 += 1;
    }

    let mut stats: Vec<SourceStats> = by_source
        .into_iter()
        .map(|(source, (pages, chunks))| SourceStats {
            source,
            pages: pages.len(),
            chunks,
        })
        .collect();
    stats.sort_by(|a, b| b.chunks.cmp(&a.chunks).then_with(|| a.source.cmp(&b.source)));
    stats
}

/// Run the info command: load the index in `dir` and print a summary.
pub fn run_info(dir: &Path) -> Result<()> {
    let (manifest, index) =
        load_index(dir).with_context(|| format!("Failed to load index from {}", dir.display()))?;

    let size: u64 = [MANIFEST_FILE, ENTRIES_FILE, VECTORS_FILE]
        .iter()
        .filter_map(|f| std::fs::metadata(dir.join(f)).ok())
        .map(|m| m.len())
        .sum();

    println!("pdf-index — Index Info");
    println!("======================");
    println!();
    println!("  Directory:   {}", dir.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Index id:    {}", manifest.index_id);
    println!("  Created:     {}", manifest.created_at.format("%Y-%m-%d %H:%M"));
    println!();
    println!("  Model:       {}", manifest.model);
    println!("  Dimensions:  {}", manifest.dims);
    println!("  Entries:     {}", manifest.count);

    let sources = source_breakdown(&index);
    if !sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>6} {:>8}", "SOURCE", "PAGES", "CHUNKS");
        println!("  {}", "-".repeat(64));
        for s in &sources {
            println!("  {:<48} {:>6} {:>8}", s.source, s.pages, s.chunks);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
