mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use common::pdf_with_pages;
use pdf_index::index_store::{save_index, FlatIndexBackend};
use pdf_index::models::{ChunkOrigin, EmbeddedChunk};
use pdf_index_core::index::IndexBackend;
use tempfile::TempDir;

fn pidx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pidx"))
}

fn run_pidx(cwd: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pidx_binary();
    let output = Command::new(&binary)
        .current_dir(cwd)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_models_lists_dimensions() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, ok) = run_pidx(tmp.path(), &["models"]);
    assert!(ok);
    assert!(stdout.contains("all-minilm-l6-v2"));
    assert!(stdout.contains("bge-base-en-v1.5"));
    assert!(stdout.contains("768"));
}

#[test]
fn test_init_writes_config_once() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, ok) = run_pidx(tmp.path(), &["init"]);
    assert!(ok);
    assert!(stdout.contains("Wrote"));

    let path = tmp.path().join("config/pidx.toml");
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("[embedding]"));

    fs::write(&path, "# edited\n").unwrap();
    let (stdout, _, ok) = run_pidx(tmp.path(), &["init"]);
    assert!(ok);
    assert!(stdout.contains("already exists"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "# edited\n");
}

#[test]
fn test_dry_run_counts_pages_and_chunks() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("documents");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(docs.join("a.pdf"), pdf_with_pages(&["alpha one", "alpha two"])).unwrap();
    fs::write(docs.join("nested/B.PDF"), pdf_with_pages(&["beta"])).unwrap();
    fs::write(docs.join("broken.pdf"), b"not a pdf").unwrap();
    fs::write(docs.join("notes.txt"), "ignored").unwrap();

    let (stdout, stderr, ok) = run_pidx(
        tmp.path(),
        &["build", "--dry-run", "--progress", "off"],
    );
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("build (dry-run)"));
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("documents skipped: 1"));
    assert!(stdout.contains("pages: 3"));
    assert!(stdout.contains("chunks: 3"));
    assert!(!tmp.path().join("faiss_index").exists());
}

#[test]
fn test_json_progress_ends_with_run_summary() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("documents");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.pdf"), pdf_with_pages(&["alpha", "beta"])).unwrap();

    let (_, stderr, ok) = run_pidx(tmp.path(), &["build", "--dry-run", "--progress", "json"]);
    assert!(ok, "stderr: {}", stderr);

    let summary = stderr
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|value| value["event"] == "summary")
        .expect("no summary line on stderr");
    assert_eq!(summary["report"]["documents_seen"], 1);
    assert_eq!(summary["report"]["pages_extracted"], 2);
    assert_eq!(summary["report"]["chunks_embedded"], 0);
}

#[test]
fn test_dry_run_honours_config_file() {
    let tmp = TempDir::new().unwrap();
    let papers = tmp.path().join("papers");
    fs::create_dir_all(&papers).unwrap();
    fs::write(papers.join("p.pdf"), pdf_with_pages(&["paper"])).unwrap();
    let config = tmp.path().join("custom.toml");
    fs::write(
        &config,
        format!("[source]\ninput_directory = {:?}\n", papers.display().to_string()),
    )
    .unwrap();

    let (stdout, stderr, ok) = run_pidx(
        tmp.path(),
        &["--config", config.to_str().unwrap(), "build", "--dry-run"],
    );
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("documents: 1"));
    assert!(stdout.contains("chunks: 1"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[embedding]\npool_size = 0\n").unwrap();

    let (_, _, ok) = run_pidx(
        tmp.path(),
        &["--config", config.to_str().unwrap(), "build", "--dry-run"],
    );
    assert!(!ok);

    fs::write(&config, "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap();
    let (_, _, ok) = run_pidx(
        tmp.path(),
        &["--config", config.to_str().unwrap(), "build", "--dry-run"],
    );
    assert!(!ok);
}

#[test]
fn test_missing_explicit_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, _, ok) = run_pidx(
        tmp.path(),
        &["--config", "does-not-exist.toml", "build", "--dry-run"],
    );
    assert!(!ok);
}

#[test]
fn test_info_summarizes_index() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("faiss_index");
    let pairs = (0..3)
        .map(|page| EmbeddedChunk {
            text: format!("page {}", page),
            vector: vec![1.0, 0.0, 0.0, 0.0],
            origin: Some(ChunkOrigin {
                source_id: "report.pdf".to_string(),
                page_index: page,
                chunk_index: 0,
            }),
        })
        .collect();
    let index = FlatIndexBackend::new("all-minilm-l6-v2", 4)
        .build_from_pairs(pairs)
        .unwrap();
    save_index(&index, &dir).unwrap();

    let (stdout, stderr, ok) = run_pidx(tmp.path(), &["info", "faiss_index"]);
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("all-minilm-l6-v2"));
    assert!(stdout.contains("Entries:     3"));
    assert!(stdout.contains("report.pdf"));
}

#[test]
fn test_info_on_missing_index_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_pidx(tmp.path(), &["info", "nowhere"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to load index"));
}
