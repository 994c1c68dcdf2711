//! Filesystem document source.
//!
//! Walks `source.input_directory` and yields every file whose extension is
//! listed in `source.extensions` (case-insensitive), minus anything matched
//! by `source.exclude_globs`. Nothing else is filtered out.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use pdf_index_core::models::Document;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::sources::{DocumentRef, DocumentSource};

/// Documents read from a directory tree.
pub struct FilesystemSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FilesystemSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let include = build_extension_set(&config.extensions)?;

        let exclude = build_globset(&config.exclude_globs)?;

        Ok(Self {
            root: config.input_directory.clone(),
            include,
            exclude,
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn scan(&self) -> Result<Vec<DocumentRef>> {
        if !self.root.is_dir() {
            bail!("Input directory does not exist: {}", self.root.display());
        }

        let mut refs = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) {
                continue;
            }
            if !self.include.is_match(&rel_str) {
                continue;
            }

            refs.push(DocumentRef {
                source_id: rel_str,
                path: Some(path.to_path_buf()),
            });
        }

        // Sort for deterministic ordering
        refs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(refs)
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }

    async fn list(&self) -> Result<Vec<DocumentRef>> {
        self.scan()
    }

    async fn fetch(&self, doc: &DocumentRef) -> Result<Document> {
        let path = match &doc.path {
            Some(path) => path.clone(),
            None => self.root.join(&doc.source_id),
        };
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Document {
            source_id: doc.source_id.clone(),
            bytes,
        })
    }
}

/// `**/*.<ext>` for every extension, matched case-insensitively.
fn build_extension_set(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let ext = ext.trim_start_matches('.');
        let glob = GlobBuilder::new(&format!("**/*.{}", ext))
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid extension: {}", ext))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &std::path::Path) -> SourceConfig {
        SourceConfig {
            input_directory: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lists_pdfs_case_insensitively_and_recursively() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("sub/B.PDF"), b"b").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"c").unwrap();

        let source = FilesystemSource::new(&config(tmp.path())).unwrap();
        let refs = source.list().await.unwrap();
        let ids: Vec<&str> = refs.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf", "sub/B.PDF"]);

        let doc = source.fetch(&refs[1]).await.unwrap();
        assert_eq!(doc.bytes, b"b");
    }

    #[tokio::test]
    async fn applies_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        std::fs::write(tmp.path().join("keep.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("drafts/skip.pdf"), b"b").unwrap();

        let mut cfg = config(tmp.path());
        cfg.exclude_globs = vec!["drafts/**".to_string()];
        let source = FilesystemSource::new(&cfg).unwrap();
        let refs = source.list().await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].source_id, "keep.pdf");
    }

    #[tokio::test]
    async fn pdfs_under_build_like_directories_are_listed() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("target")).unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules")).unwrap();
        std::fs::write(tmp.path().join("a.pdf"), b"a").unwrap();
        std::fs::write(tmp.path().join("target/q3-sales-target.pdf"), b"b").unwrap();
        std::fs::write(tmp.path().join("node_modules/readme.pdf"), b"c").unwrap();

        let source = FilesystemSource::new(&config(tmp.path())).unwrap();
        let refs = source.list().await.unwrap();
        let ids: Vec<&str> = refs.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["a.pdf", "node_modules/readme.pdf", "target/q3-sales-target.pdf"]
        );
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let source = FilesystemSource::new(&config(&tmp.path().join("nope"))).unwrap();
        assert!(source.list().await.is_err());
    }

    #[tokio::test]
    async fn empty_directory_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        let source = FilesystemSource::new(&config(tmp.path())).unwrap();
        assert!(source.list().await.unwrap().is_empty());
    }
}
