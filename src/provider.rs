//! Vector provider: random-access to raw vectors by ordinal (component C1).
//!
//! Vectors are stored in Structure-of-Arrays layout (`[v0[0..d], v1[0..d], ...]`)
//! for cache-friendly scans, the same layout `VamanaIndex` uses upstream.

use crate::error::{IndexError, Result};

/// Read-only random access to a set of equal-dimension vectors.
///
/// Implementations may be "unshared" (the returned view is safe to mutate)
/// or "shared" (must be treated as immutable); the core only ever reads
/// through this trait, so the distinction doesn't change behavior here.
pub trait VectorProvider {
    /// Number of vectors currently stored.
    fn size(&self) -> usize;

    /// Dimension shared by every vector.
    fn dimension(&self) -> usize;

    /// Read-only view of the vector at `ordinal`, or `None` if out of range.
    fn vector_at(&self, ordinal: u32) -> Option<&[f32]>;
}

/// An owning, append-only vector store: the "list-like, mutable append"
/// provider variant from the data model.
#[derive(Debug, Default)]
pub struct VectorStore {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Append a vector, returning nothing — the caller (graph store) owns
    /// ordinal assignment since it must stay in lock-step with neighbor-list
    /// allocation.
    pub fn push(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorProvider for VectorStore {
    fn size(&self) -> usize {
        self.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector_at(&self, ordinal: u32) -> Option<&[f32]> {
        let idx = ordinal as usize;
        if idx >= self.len() {
            return None;
        }
        let start = idx * self.dimension;
        let end = start + self.dimension;
        Some(&self.data[start..end])
    }
}

/// A provider backed purely by PQ codes: raw vectors cannot be reconstructed,
/// only a similarity against a query can be computed (component C1's
/// "compressed" variant).
pub trait CompressedVectorProvider {
    fn size(&self) -> usize;
    fn dimension(&self) -> usize;

    /// Approximate similarity between `query` (raw, uncompressed) and the
    /// `ordinal`-th stored (compressed) vector.
    fn similarity_to(&self, query: &[f32], ordinal: u32) -> Option<f32>;
}

/// A [`CompressedVectorProvider`] backed by a trained PQ codec and the
/// per-ordinal codes produced by [`crate::builder::Builder::encode_all`].
/// Each call to `similarity_to` builds its own asymmetric distance table, so
/// this is the convenient-but-not-fastest path: a graph search that needs to
/// score many ordinals against the same query should build the table once
/// (see `search::search_pq`) rather than go through this trait per ordinal.
pub struct PqCodeStore<'a> {
    pq: &'a crate::pq::ProductQuantizer,
    codes: &'a [Vec<u8>],
    similarity: crate::similarity::Similarity,
}

impl<'a> PqCodeStore<'a> {
    pub fn new(pq: &'a crate::pq::ProductQuantizer, codes: &'a [Vec<u8>], similarity: crate::similarity::Similarity) -> Self {
        Self { pq, codes, similarity }
    }
}

impl CompressedVectorProvider for PqCodeStore<'_> {
    fn size(&self) -> usize {
        self.codes.len()
    }

    fn dimension(&self) -> usize {
        self.pq.dimension()
    }

    fn similarity_to(&self, query: &[f32], ordinal: u32) -> Option<f32> {
        let code = self.codes.get(ordinal as usize)?;
        let table = self.pq.build_distance_table(query, self.similarity).ok()?;
        Some(crate::pq::ProductQuantizer::score_with_table(&table, code, self.similarity))
    }
}

/// Brute-force top-`top_k` scan over a compressed provider. Unlike
/// [`crate::search::search_pq`], this needs no graph at all — it exists for
/// callers who only have a trained codec and its codes (no proximity graph
/// built yet, or one deliberately bypassed).
pub fn pq_brute_force_top_k(provider: &impl CompressedVectorProvider, query: &[f32], top_k: usize) -> Vec<(u32, f32)> {
    let mut scored: Vec<(u32, f32)> = (0..provider.size() as u32)
        .filter_map(|ord| provider.similarity_to(query, ord).map(|s| (ord, s)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(b.0.cmp(&a.0)));
    scored.truncate(top_k);
    scored
}

/// L2-normalize a vector in place is avoided in favor of returning a new
/// vector, since the graph store's [`VectorStore`] is append-only and the
/// caller pre-normalizes before insertion.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = crate::simd::norm(v);
    if n > 1e-9 {
        v.iter().map(|x| x / n).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_read_back() {
        let mut store = VectorStore::new(3);
        store.push(&[1.0, 2.0, 3.0]).unwrap();
        store.push(&[4.0, 5.0, 6.0]).unwrap();
        assert_eq!(store.size(), 2);
        assert_eq!(store.vector_at(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(store.vector_at(1), Some(&[4.0, 5.0, 6.0][..]));
        assert_eq!(store.vector_at(2), None);
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let mut store = VectorStore::new(3);
        let err = store.push(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(&[3.0, 4.0]);
        assert!((crate::simd::norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn pq_code_store_brute_force_finds_nearest() {
        use crate::pq::{ProductQuantizer, CODEBOOK_SIZE};
        use crate::similarity::Similarity;

        let mut pq = ProductQuantizer::new(1, 1, false).unwrap();
        let codebook: Vec<f32> = (0..CODEBOOK_SIZE).map(|k| k as f32).collect();
        pq.load_trained(None, vec![codebook]).unwrap();
        let codes: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i]).collect();

        let store = PqCodeStore::new(&pq, &codes, Similarity::Euclidean);
        assert_eq!(store.size(), 6);
        let results = pq_brute_force_top_k(&store, &[4.1], 1);
        assert_eq!(results[0].0, 4);
    }
}
