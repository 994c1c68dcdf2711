//! Recursive character text splitter.
//!
//! Splits page text into chunks of at most `chunk_size` characters, with
//! consecutive chunks sharing up to `chunk_overlap` characters of context.
//! Lengths are measured in Unicode scalar values, not bytes.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs in
//!    the text. The empty separator always matches and splits per character.
//! 2. Split on it, keeping each separator attached to the start of the piece
//!    that follows it.
//! 3. Merge consecutive pieces shorter than `chunk_size` greedily. When the
//!    next piece would overflow, emit the window and drop pieces from its
//!    front until at most `chunk_overlap` characters remain; those carry over
//!    as the start of the next chunk.
//! 4. Pieces of `chunk_size` characters or more are split again with the
//!    remaining, finer separators.
//! 5. Every emitted chunk is trimmed; empty ones are dropped. Newlines are
//!    then replaced with single spaces.
//!
//! # Example
//!
//! ```rust
//! use pdf_index_core::chunk::{split_text, SplitterConfig};
//!
//! let config = SplitterConfig::new(1000, 100).unwrap();
//! let text = "x".repeat(1500);
//! let chunks = split_text(&text, &config);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].chars().count(), 1000);
//! assert_eq!(chunks[1], text[900..]);
//! ```

use std::collections::VecDeque;

use thiserror::Error;

use crate::models::{Chunk, ChunkOrigin, PageText};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Invalid splitter parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("chunk_size must be > 0")]
    ZeroChunkSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// Validated splitter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitError> {
        if chunk_size == 0 {
            return Err(SplitError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitError::OverlapTooLarge {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// # Guarantees
///
/// - Every chunk has `1..=chunk_size` characters.
/// - No chunk contains `'\n'`.
/// - Empty or whitespace-only input yields no chunks.
/// - Never fails; the per-character fallback always makes progress.
pub fn split_text(text: &str, config: &SplitterConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
        .into_iter()
        .map(|chunk| chunk.replace('\n', " "))
        .collect()
}

/// Split one page into [`Chunk`]s.
///
/// With `track_origin` set, each chunk records its source document, page
/// and position within the page.
pub fn split_page(page: &PageText, config: &SplitterConfig, track_origin: bool) -> Vec<Chunk> {
    split_text(&page.text, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            origin: track_origin.then(|| ChunkOrigin {
                source_id: page.source_id.clone(),
                page_index: page.page_index,
                chunk_index,
            }),
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], config: &SplitterConfig) -> Vec<String> {
    let mut separator = "";
    let mut finer: &[&str] = &[];
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            break;
        }
        if text.contains(sep) {
            separator = sep;
            finer = &separators[i + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            chunks.extend(merge_pieces(&fitting, config));
            fitting.clear();
        }
        if finer.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, finer, config));
        }
    }

    if !fitting.is_empty() {
        chunks.extend(merge_pieces(&fitting, config));
    }

    chunks
}

/// Split on `separator`, attaching each separator to the piece after it.
/// An empty separator yields one piece per character.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn merge_pieces(pieces: &[&str], config: &SplitterConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > config.chunk_size && !window.is_empty() {
            if let Some(chunk) = join_window(&window) {
                chunks.push(chunk);
            }
            while total > config.chunk_overlap || (total > 0 && total + len > config.chunk_size) {
                match window.pop_front() {
                    Some((_, dropped)) => total -= dropped,
                    None => break,
                }
            }
        }

        window.push_back((piece, len));
        total += len;
    }

    if let Some(chunk) = join_window(&window) {
        chunks.push(chunk);
    }
    chunks
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize) -> SplitterConfig {
        SplitterConfig::new(size, overlap).unwrap()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, world!", &SplitterConfig::default());
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        assert!(split_text("", &SplitterConfig::default()).is_empty());
        assert!(split_text("  \n\n \n ", &SplitterConfig::default()).is_empty());
    }

    #[test]
    fn test_no_break_points_hard_cut_with_overlap() {
        let text: String = (0..1500).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = split_text(&text, &SplitterConfig::default());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], text[..1000]);
        assert_eq!(chunks[1], text[900..]);
    }

    #[test]
    fn test_chunks_never_exceed_size() {
        let text = (0..400)
            .map(|i| format!("Sentence {} talks about item {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join(" ");
        let text = format!("{}\n\n{}\n{}", text, "y".repeat(3000), text);

        for (size, overlap) in [(50, 10), (200, 0), (1000, 100), (7, 3)] {
            let cfg = config(size, overlap);
            let chunks = split_text(&text, &cfg);
            assert!(!chunks.is_empty());
            for c in &chunks {
                let len = c.chars().count();
                assert!(len >= 1 && len <= size, "chunk of {} chars for size {}", len, size);
            }
        }
    }

    #[test]
    fn test_overlap_is_exact_for_character_cuts() {
        let text = "0123456789".repeat(10);
        let chunks = split_text(&text, &config(30, 5));
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 5).collect();
            assert!(pair[1].starts_with(&tail), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "a ".repeat(20).trim().to_string();
        let para_b = "b ".repeat(20).trim().to_string();
        let text = format!("{}\n\n{}", para_a, para_b);

        let chunks = split_text(&text, &config(45, 0));
        assert_eq!(chunks, vec![para_a, para_b]);
    }

    #[test]
    fn test_word_boundaries_before_characters() {
        let chunks = split_text("alpha beta gamma delta epsilon", &config(12, 0));
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon"]);
    }

    #[test]
    fn test_newlines_replaced_with_spaces() {
        let chunks = split_text("line one\nline two\nline three", &SplitterConfig::default());
        assert_eq!(chunks, vec!["line one line two line three".to_string()]);
    }

    #[test]
    fn test_multibyte_chars_counted_as_characters() {
        let text = "é".repeat(25);
        let chunks = split_text(&text, &config(10, 2));
        for c in &chunks {
            assert!(c.chars().count() <= 10);
        }
        assert_eq!(chunks[0], "é".repeat(10));
        assert_eq!(chunks[1], "é".repeat(10));
    }

    #[test]
    fn test_split_page_tracks_origin() {
        let page = PageText {
            source_id: "reports/q1.pdf".to_string(),
            page_index: 3,
            text: "x".repeat(25),
        };
        let chunks = split_page(&page, &config(10, 0), true);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            let origin = c.origin.as_ref().unwrap();
            assert_eq!(origin.source_id, "reports/q1.pdf");
            assert_eq!(origin.page_index, 3);
            assert_eq!(origin.chunk_index, i);
        }

        let untracked = split_page(&page, &config(10, 0), false);
        assert!(untracked.iter().all(|c| c.origin.is_none()));
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(SplitterConfig::new(0, 0), Err(SplitError::ZeroChunkSize));
        assert_eq!(
            SplitterConfig::new(100, 100),
            Err(SplitError::OverlapTooLarge {
                size: 100,
                overlap: 100
            })
        );
        assert!(SplitterConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta gamma\n\nDelta epsilon zeta eta theta";
        let a = split_text(text, &config(12, 4));
        let b = split_text(text, &config(12, 4));
        assert_eq!(a, b);
    }
}
