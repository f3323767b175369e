//! In-memory similarity index
//!
//! Exact cosine search over every stored vector. Vectors are normalized once
//! at build time so a query costs one dot product per entry. The index is
//! immutable; a changed corpus means building a new one.

use super::error::{Result, SearchError};
use super::store::EmbeddingRecord;
use super::units::UnitKind;

/// Identity of the unit stored at one index position
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub conv_id: String,
    pub kind: UnitKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<'a> {
    pub entry: &'a IndexEntry,
    pub score: f32,
}

#[derive(Debug, Default)]
pub struct SimilarityIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
    /// Row-major, `entries.len() * dimension` values
    vectors: Vec<f32>,
}

impl SimilarityIndex {
    /// Build from records, keeping their order
    pub fn build(records: &[EmbeddingRecord]) -> Result<Self> {
        let dimension = records.first().map(|r| r.vector.len()).unwrap_or(0);
        let mut entries = Vec::with_capacity(records.len());
        let mut vectors = Vec::with_capacity(records.len() * dimension);

        for record in records {
            if record.vector.len() != dimension {
                return Err(SearchError::DimensionMismatch {
                    id: record.id.clone(),
                    expected: dimension,
                    found: record.vector.len(),
                });
            }
            vectors.extend(normalized(&record.vector));
            entries.push(IndexEntry {
                id: record.id.clone(),
                conv_id: record.conv_id.clone(),
                kind: record.kind,
            });
        }

        Ok(Self {
            dimension,
            entries,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The `k` most similar entries, best first
    ///
    /// Equal scores keep index order, so identical queries always return
    /// identical sequences.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<'_>>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                found: query.len(),
            });
        }

        let query = normalized(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| row.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>())
            .enumerate()
            .collect();

        // Stable sort: ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| Neighbor {
                entry: &self.entries[pos],
                score,
            })
            .collect())
    }
}

/// Unit-length copy; zero vectors stay zero and score 0 against anything
fn normalized(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector.iter().map(|x| x / norm).collect()
    } else {
        vec![0.0; vector.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: id.to_string(),
            conv_id: format!("conv-{}", id),
            kind: UnitKind::Message,
            vector,
        }
    }

    fn ids(neighbors: &[Neighbor<'_>]) -> Vec<String> {
        neighbors.iter().map(|n| n.entry.id.clone()).collect()
    }

    #[test]
    fn test_top_k_order() -> Result<()> {
        let index = SimilarityIndex::build(&[
            record("east", vec![1.0, 0.0]),
            record("north", vec![0.0, 1.0]),
            record("northeast", vec![2.0, 2.0]),
            record("west", vec![-1.0, 0.0]),
        ])?;
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimension(), 2);

        let hits = index.top_k(&[1.0, 0.1], 3)?;
        assert_eq!(ids(&hits), vec!["east", "northeast", "north"]);
        assert!(hits[0].score > hits[1].score);
        assert!((index.top_k(&[5.0, 0.0], 1)?[0].score - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_ties_keep_insertion_order() -> Result<()> {
        let index = SimilarityIndex::build(&[
            record("b", vec![0.0, 1.0]),
            record("a", vec![1.0, 0.0]),
            record("c", vec![2.0, 0.0]),
            record("zero", vec![0.0, 0.0]),
        ])?;

        let first = index.top_k(&[1.0, 0.0], 4)?;
        assert_eq!(ids(&first), vec!["a", "c", "b", "zero"]);

        let second = index.top_k(&[1.0, 0.0], 4)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_dimension_checks() -> Result<()> {
        let mixed = [record("a", vec![1.0, 0.0]), record("b", vec![1.0])];
        assert!(matches!(
            SimilarityIndex::build(&mixed),
            Err(SearchError::DimensionMismatch { .. })
        ));

        let index = SimilarityIndex::build(&[record("a", vec![1.0, 0.0])])?;
        assert!(index.top_k(&[1.0, 0.0, 0.0], 1).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_index() -> Result<()> {
        let index = SimilarityIndex::build(&[])?;
        assert!(index.is_empty());
        assert!(index.top_k(&[1.0], 10)?.is_empty());
        Ok(())
    }
}
