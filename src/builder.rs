//! Incremental concurrent insertion (component C8).
//!
//! Grounded on the upstream two-pass Vamana construction (search against the
//! current graph, diversify, write back) collapsed into a single incremental
//! step per §4.7: the upstream builds in two batch passes over a randomly
//! wired graph; this version searches the already-published subset on every
//! insertion instead, which is what makes concurrent incremental insertion
//! possible at all.

use tracing::instrument;

use crate::config::BuilderConfig;
use crate::diversify::diversify;
use crate::error::{IndexError, Result};
use crate::graph::GraphStore;
use crate::provider::{normalize, VectorProvider};
use crate::search;

/// Builds and queries a proximity graph under the given [`BuilderConfig`].
pub struct Builder {
    config: BuilderConfig,
    graph: GraphStore,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Result<Self> {
        config.validate()?;
        let graph = GraphStore::new(config.similarity, config.m as usize, config.dimension as usize);
        Ok(Self { config, graph })
    }

    pub(crate) fn from_parts(config: BuilderConfig, graph: GraphStore) -> Self {
        Self { config, graph }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prepare(&self, vector: &[f32]) -> Result<Vec<f32>> {
        if vector.len() != self.config.dimension as usize {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimension as usize,
                actual: vector.len(),
            });
        }
        Ok(if self.config.similarity.requires_normalization() {
            normalize(vector)
        } else {
            vector.to_vec()
        })
    }

    /// Insert `vector`, returning its assigned ordinal.
    #[instrument(skip(self, vector), fields(ord, bootstrap))]
    pub fn insert(&self, vector: &[f32]) -> Result<u32> {
        let prepared = self.prepare(vector)?;
        let ord = self.graph.allocate_node(&prepared)?;
        tracing::Span::current().record("ord", ord);

        if self.graph.try_set_entry_point_if_empty(ord) {
            tracing::Span::current().record("bootstrap", true);
            self.graph.publish(ord)?;
            return Ok(ord);
        }
        tracing::Span::current().record("bootstrap", false);

        let ef = self.config.ef_construction as usize;
        let pool = search::search(&self.graph, &prepared, ef, ef)?;
        let candidates: Vec<(u32, f32)> = pool.into_iter().filter(|&(o, _)| o != ord).collect();

        let selected = {
            let view = self.graph.read();
            diversify(
                &prepared,
                &candidates,
                self.config.m as usize,
                &view,
                self.config.similarity,
                self.config.alpha,
            )
        };

        if let Some(nl) = self.graph.neighbor_list_arc(ord) {
            nl.set(selected.clone());
        }
        self.graph.publish(ord)?;

        for &(v, score) in &selected {
            let Some(nl) = self.graph.neighbor_list_arc(v) else {
                continue;
            };
            let view = self.graph.read();
            let Some(owner_vec) = view.vector_at(v).map(<[f32]>::to_vec) else {
                continue;
            };
            nl.insert_diverse(
                v,
                &owner_vec,
                &[(ord, score)],
                &view,
                self.config.similarity,
                self.config.alpha,
            );
        }

        if let Some(entry) = self.graph.entry() {
            if entry != ord {
                let view = self.graph.read();
                if let Some(entry_vec) = view.vector_at(entry).map(<[f32]>::to_vec) {
                    let score_to_entry = self.config.similarity.score(&prepared, &entry_vec);
                    drop(view);
                    self.graph.maybe_promote_entry(ord, score_to_entry);
                }
            }
        }

        Ok(ord)
    }

    /// Approximate top-`top_k` search for `query`.
    #[instrument(skip(self, query), fields(top_k, ef_search, results))]
    pub fn search(&self, query: &[f32], top_k: usize, ef_search: usize) -> Result<Vec<(u32, f32)>> {
        let prepared = self.prepare(query)?;
        let results = search::search(&self.graph, &prepared, top_k, ef_search)?;
        tracing::Span::current().record("results", results.len());
        Ok(results)
    }

    /// Train a [`crate::pq::ProductQuantizer`] from every vector currently in
    /// the graph. Needs at least `CODEBOOK_SIZE` inserted vectors.
    #[instrument(skip(self, rng), fields(m_pq, centered, samples))]
    pub fn train_pq(&self, m_pq: usize, centered: bool, rng: &mut impl rand::Rng) -> Result<crate::pq::ProductQuantizer> {
        let view = self.graph.read();
        let n = view.size();
        let dim = self.config.dimension as usize;
        let mut samples = Vec::with_capacity(n * dim);
        for ord in 0..n as u32 {
            let v = view.vector_at(ord).ok_or(IndexError::OrdinalOutOfRange(ord))?;
            samples.extend_from_slice(v);
        }
        drop(view);
        tracing::Span::current().record("samples", n);
        if n == crate::pq::CODEBOOK_SIZE {
            tracing::warn!(
                samples = n,
                "training PQ codec right at the minimum sample floor; centroid quality may suffer"
            );
        }
        let mut pq = crate::pq::ProductQuantizer::new(dim, m_pq, centered)?;
        pq.fit(&samples, n, rng)?;
        Ok(pq)
    }

    /// PQ-encode every vector currently in the graph, indexed by ordinal.
    pub fn encode_all(&self, pq: &crate::pq::ProductQuantizer) -> Result<Vec<Vec<u8>>> {
        let view = self.graph.read();
        let n = view.size();
        let mut codes = Vec::with_capacity(n);
        for ord in 0..n as u32 {
            let v = view.vector_at(ord).ok_or(IndexError::OrdinalOutOfRange(ord))?;
            codes.push(pq.encode(v)?);
        }
        Ok(codes)
    }

    /// Approximate search scored through a trained PQ codec instead of raw
    /// vectors, optionally reranking the shortlist against raw vectors.
    pub fn search_pq(
        &self,
        pq: &crate::pq::ProductQuantizer,
        codes: &[Vec<u8>],
        query: &[f32],
        top_k: usize,
        ef_search: usize,
        rerank: bool,
    ) -> Result<Vec<(u32, f32)>> {
        let prepared = self.prepare(query)?;
        search::search_pq(&self.graph, pq, codes, &prepared, top_k, ef_search, rerank)
    }

    pub fn serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        crate::serialize::write_graph(&self.graph, &self.config, writer)
    }

    pub fn deserialize<R: std::io::Read>(reader: &mut R) -> Result<Self> {
        let (graph, config) = crate::serialize::read_graph(reader)?;
        Ok(Self::from_parts(config, graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::Similarity;

    fn builder(dim: u16, sim: Similarity, m: u16) -> Builder {
        Builder::new(BuilderConfig::new(dim, sim, m, (m as usize * 2) as u16, 1.2).unwrap()).unwrap()
    }

    #[test]
    fn scenario_dot_product_three_points() {
        let b = builder(3, Similarity::DotProduct, 1);
        b.insert(&[0.1, 0.15, 0.3]).unwrap();
        b.insert(&[0.2, 0.83, 0.05]).unwrap();
        b.insert(&[0.5, 0.5, 0.5]).unwrap();

        let results = b.search(&[0.15, 0.1, 0.1], 3, 20).unwrap();
        let ords: Vec<u32> = results.iter().map(|&(o, _)| o).collect();
        assert_eq!(ords, vec![2, 1, 0]);
    }

    #[test]
    fn self_recall_on_uniform_data() {
        // d=128, M=16, ef_search=M: the exact bar named by the self-recall law.
        let config = BuilderConfig::new(128, Similarity::Euclidean, 16, 64, 1.2).unwrap();
        let b = Builder::new(config).unwrap();
        let mut ords = Vec::new();
        let mut seed = 1u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        let mut vectors = Vec::new();
        for _ in 0..1000 {
            let v: Vec<f32> = (0..128).map(|_| next()).collect();
            vectors.push(v);
        }
        for v in &vectors {
            ords.push(b.insert(v).unwrap());
        }
        let mut hits = 0;
        for (i, v) in vectors.iter().enumerate() {
            let results = b.search(v, 1, 16).unwrap();
            if results.first().map(|&(o, _)| o) == Some(ords[i]) {
                hits += 1;
            }
        }
        assert!(hits as f64 / vectors.len() as f64 >= 0.99);
    }

    #[test]
    fn rejects_wrong_dimension_insert() {
        let b = builder(3, Similarity::Euclidean, 2);
        let err = b.insert(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn neighbor_lists_respect_degree_bound() {
        let b = builder(4, Similarity::Euclidean, 4);
        let mut seed = 42u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((seed >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        for _ in 0..100 {
            let v: Vec<f32> = (0..4).map(|_| next()).collect();
            b.insert(&v).unwrap();
        }
        for ord in 0..b.graph().allocated_len() as u32 {
            let nl = b.graph().neighbor_list_arc(ord).unwrap();
            let snap = nl.snapshot();
            assert!(snap.len() <= 4);
            let mut seen = std::collections::HashSet::new();
            for &(n, _) in &snap {
                assert_ne!(n, ord);
                assert!(seen.insert(n));
            }
        }
    }

    #[test]
    fn entry_point_promotes_when_a_later_insert_is_much_closer() {
        let config = BuilderConfig::new(1, Similarity::Euclidean, 1, 2, 1.0).unwrap();
        let b = Builder::new(config).unwrap();

        let e = b.insert(&[0.0]).unwrap();
        assert_eq!(b.graph().entry(), Some(e));

        // Far from the entry point: becomes its sole back-linked neighbor,
        // so the entry's own best-neighbor score stays low.
        b.insert(&[10.0]).unwrap();
        assert_eq!(b.graph().entry(), Some(e));

        // Much closer to the entry than its current best neighbor is: the
        // candidate's score to the entry beats the entry's best-neighbor
        // score, so the entry point must move to this new node.
        let closer = b.insert(&[0.1]).unwrap();
        assert_eq!(b.graph().entry(), Some(closer));
    }

    #[test]
    fn pq_accelerated_search_recalls_reasonably() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let b = builder(4, Similarity::Euclidean, 16);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut vectors = Vec::new();
        for _ in 0..300 {
            let v: Vec<f32> = (0..4).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            b.insert(&v).unwrap();
            vectors.push(v);
        }

        let mut train_rng = ChaCha8Rng::seed_from_u64(14);
        let pq = b.train_pq(2, false, &mut train_rng).unwrap();
        let codes = b.encode_all(&pq).unwrap();

        let mut hits = 0;
        for v in &vectors {
            let results = b.search_pq(&pq, &codes, v, 5, 32, true).unwrap();
            if results.iter().any(|&(_, s)| s > 0.9) {
                hits += 1;
            }
        }
        assert!(hits as f64 / vectors.len() as f64 >= 0.5);
    }
}
