//! Flat (exhaustive) vector index.
//!
//! Stores every entry in a `Vec` sorted by content id, so two builds from the
//! same chunks produce the same table regardless of arrival order. Search is
//! brute-force cosine similarity over all entries.

use sha2::{Digest, Sha256};

use super::{IndexEntry, IndexError, SearchHit};
use crate::embedding::cosine_similarity;
use crate::models::{ChunkOrigin, EmbeddedChunk};

/// Exact nearest-neighbour index over a fixed set of embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Build an index from the full set of embedded chunks.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Dimension`] if any vector's length differs from
    /// `dims`, and [`IndexError::ZeroDimension`] if `dims` is zero.
    pub fn build(
        model: impl Into<String>,
        dims: usize,
        pairs: Vec<EmbeddedChunk>,
    ) -> Result<Self, IndexError> {
        let entries = pairs
            .into_iter()
            .map(|pair| IndexEntry {
                id: entry_id(&pair.text, pair.origin.as_ref()),
                text: pair.text,
                origin: pair.origin,
                vector: pair.vector,
            })
            .collect();
        Self::from_entries(model, dims, entries)
    }

    /// Rebuild an index from previously stored entries.
    pub fn from_entries(
        model: impl Into<String>,
        dims: usize,
        mut entries: Vec<IndexEntry>,
    ) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::ZeroDimension);
        }
        for (index, entry) in entries.iter().enumerate() {
            if entry.vector.len() != dims {
                return Err(IndexError::Dimension {
                    index,
                    expected: dims,
                    got: entry.vector.len(),
                });
            }
        }
        entries.sort_by(|a, b| {
            a.id.cmp(&b.id).then_with(|| {
                a.vector
                    .iter()
                    .zip(b.vector.iter())
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        Ok(Self {
            model: model.into(),
            dims,
            entries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// A query of the wrong dimension matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if query.len() != self.dims || k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                id: entry.id.clone(),
                text: entry.text.clone(),
                origin: entry.origin.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

/// Content id: SHA-256 over the text and, when present, its origin.
fn entry_id(text: &str, origin: Option<&ChunkOrigin>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    if let Some(origin) = origin {
        hasher.update([0u8]);
        hasher.update(origin.source_id.as_bytes());
        hasher.update((origin.page_index as u64).to_le_bytes());
        hasher.update((origin.chunk_index as u64).to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(text: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            text: text.to_string(),
            vector,
            origin: None,
        }
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let err = FlatIndex::build(
            "m",
            3,
            vec![pair("a", vec![1.0, 0.0, 0.0]), pair("b", vec![1.0, 0.0])],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Dimension {
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_dimension() {
        assert!(matches!(
            FlatIndex::build("m", 0, vec![]),
            Err(IndexError::ZeroDimension)
        ));
    }

    #[test]
    fn test_build_is_order_independent() {
        let pairs = vec![
            pair("alpha", vec![1.0, 0.0]),
            pair("beta", vec![0.0, 1.0]),
            pair("gamma", vec![0.7, 0.7]),
        ];
        let mut reversed = pairs.clone();
        reversed.reverse();

        let a = FlatIndex::build("m", 2, pairs).unwrap();
        let b = FlatIndex::build("m", 2, reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_origin_distinguishes_identical_text() {
        let origin = |page| ChunkOrigin {
            source_id: "a.pdf".to_string(),
            page_index: page,
            chunk_index: 0,
        };
        assert_ne!(
            entry_id("same", Some(&origin(0))),
            entry_id("same", Some(&origin(1)))
        );
        assert_ne!(entry_id("same", None), entry_id("same", Some(&origin(0))));
    }

    #[test]
    fn test_search_ranks_by_cosine() {
        let index = FlatIndex::build(
            "m",
            2,
            vec![
                pair("east", vec![1.0, 0.0]),
                pair("north", vec![0.0, 1.0]),
                pair("north-east", vec![0.7, 0.7]),
            ],
        )
        .unwrap();

        let hits = index.search(&[0.9, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "north-east");
        assert!(hits[0].score >= hits[1].score);

        assert!(index.search(&[1.0, 0.0, 0.0], 5).is_empty());
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
    }
}
