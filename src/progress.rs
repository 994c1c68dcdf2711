//! Build progress reporting.
//!
//! Reports observable progress during `pidx build` so users see how many
//! documents have been read and how many chunks are embedded. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::context::RunReport;

/// A single progress event for a build.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The source is listing documents. Total unknown.
    Discovering { source: String },
    /// `n` of `total` documents extracted and split.
    Extracting { n: u64, total: u64 },
    /// `chunks` embedded across `batches` completed batches.
    Embedding { batches: u64, chunks: u64 },
    /// The index is being written to `dir`.
    Saving { dir: String, entries: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline coordinator.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "build  embedding  1,200 chunks (12 batches)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering { source } => {
                format!("build {}  discovering...\n", source)
            }
            ProgressEvent::Extracting { n, total } => format!(
                "build  extracting  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Embedding { batches, chunks } => format!(
                "build  embedding  {} chunks ({} batches)\n",
                format_number(*chunks),
                format_number(*batches)
            ),
            ProgressEvent::Saving { dir, entries } => format!(
                "build  saving  {} entries to {}\n",
                format_number(*entries),
                dir
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering { source } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "source": source
            }),
            ProgressEvent::Extracting { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "n": n,
                "total": total
            }),
            ProgressEvent::Embedding { batches, chunks } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "batches": batches,
                "chunks": chunks
            }),
            ProgressEvent::Saving { dir, entries } => serde_json::json!({
                "event": "progress",
                "phase": "saving",
                "dir": dir,
                "entries": entries
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// The JSON-lines record for a finished run: `{"event":"summary","report":{..}}`.
pub fn summary_line(report: &RunReport) -> serde_json::Result<String> {
    serde_json::to_string(&serde_json::json!({
        "event": "summary",
        "report": report,
    }))
}

/// Write [`summary_line`] to stderr.
pub fn emit_summary(report: &RunReport) {
    if let Ok(line) = summary_line(report) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.flush();
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Format an integer with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
