//! Best-first beam search over a [`GraphStore`] (component C7).
//!
//! The traversal loop is grounded on the upstream Vamana `search` function's
//! `BinaryHeap`-plus-visited-set shape, generalized from a single
//! fixed-entry cosine search to the scored, terminating beam search the
//! design calls for (frontier popped by best score, early stop once the
//! frontier can no longer improve the working set).

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;

use crate::bitset::GrowableBitset;
use crate::candidates::{better, BoundedCandidates};
use crate::error::{IndexError, Result};
use crate::graph::GraphStore;
use crate::provider::VectorProvider;
use crate::similarity::Similarity;

#[derive(Clone, Copy, PartialEq)]
struct Frontier {
    ord: u32,
    score: f32,
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        if better((self.ord, self.score), (other.ord, other.score)) {
            CmpOrdering::Greater
        } else if better((other.ord, other.score), (self.ord, self.score)) {
            CmpOrdering::Less
        } else {
            CmpOrdering::Equal
        }
    }
}

/// NaN/infinite scores are treated as worst-possible rather than propagated,
/// so a single malformed vector can't fail an otherwise-healthy search.
#[inline]
fn safe_score(similarity: Similarity, a: &[f32], b: &[f32]) -> f32 {
    let s = similarity.score(a, b);
    if s.is_finite() {
        s
    } else {
        f32::MIN
    }
}

/// Run a single best-first query against `graph`, returning at most
/// `top_k` `(ordinal, score)` pairs, best first.
pub fn search(graph: &GraphStore, query: &[f32], top_k: usize, ef_search: usize) -> Result<Vec<(u32, f32)>> {
    let entry = graph.entry().ok_or(IndexError::EmptyGraph)?;
    let view = graph.read();
    if query.len() != view.dimension() {
        return Err(IndexError::DimensionMismatch {
            expected: view.dimension(),
            actual: query.len(),
        });
    }

    let ef = ef_search.max(top_k).max(1);
    let similarity = graph.similarity();

    let mut w = BoundedCandidates::new(ef);
    let mut visited = GrowableBitset::with_capacity(view.size().max(64));
    let mut frontier: BinaryHeap<Frontier> = BinaryHeap::new();

    let entry_vec = view
        .vector_at(entry)
        .ok_or(IndexError::OrdinalOutOfRange(entry))?;
    let entry_score = safe_score(similarity, query, entry_vec);
    visited.set(entry);
    w.push(entry, entry_score);
    frontier.push(Frontier {
        ord: entry,
        score: entry_score,
    });

    while let Some(&top) = frontier.peek() {
        let worst = w.peek_worst_score().unwrap_or(f32::NEG_INFINITY);
        if top.score < worst {
            break;
        }
        let u = frontier.pop().expect("peeked above");

        let Some(neighbors) = view.neighbor_list(u.ord) else {
            continue;
        };
        for (v, _) in neighbors.snapshot() {
            if visited.get(v) {
                continue;
            }
            visited.set(v);

            let Some(v_vec) = view.vector_at(v) else {
                continue;
            };
            let score = safe_score(similarity, query, v_vec);

            let worst_now = w.peek_worst_score().unwrap_or(f32::NEG_INFINITY);
            if !w.is_full() || score > worst_now {
                if w.push(v, score) {
                    frontier.push(Frontier { ord: v, score });
                }
            }
        }
    }

    Ok(w.top_k(top_k))
}

/// Same traversal as [`search`], but scoring candidates through a PQ
/// asymmetric distance table instead of the raw vectors — the "PQ codec
/// installed" path from the design. `codes[ord]` must be the PQ encoding of
/// node `ord`'s raw vector. When `rerank` is set, the returned `top_k` are
/// rescored against their raw vectors before the final sort, trading one
/// extra raw-vector pass for exact-on-the-shortlist accuracy.
pub fn search_pq(
    graph: &GraphStore,
    pq: &crate::pq::ProductQuantizer,
    codes: &[Vec<u8>],
    query: &[f32],
    top_k: usize,
    ef_search: usize,
    rerank: bool,
) -> Result<Vec<(u32, f32)>> {
    let entry = graph.entry().ok_or(IndexError::EmptyGraph)?;
    let view = graph.read();
    if query.len() != view.dimension() {
        return Err(IndexError::DimensionMismatch {
            expected: view.dimension(),
            actual: query.len(),
        });
    }

    let similarity = graph.similarity();
    let table = pq.build_distance_table(query, similarity)?;
    let score_of = |ord: u32| -> f32 {
        codes
            .get(ord as usize)
            .map(|c| crate::pq::ProductQuantizer::score_with_table(&table, c, similarity))
            .unwrap_or(f32::MIN)
    };

    let ef = ef_search.max(top_k).max(1);
    let mut w = BoundedCandidates::new(ef);
    let mut visited = GrowableBitset::with_capacity(view.size().max(64));
    let mut frontier: BinaryHeap<Frontier> = BinaryHeap::new();

    let entry_score = score_of(entry);
    visited.set(entry);
    w.push(entry, entry_score);
    frontier.push(Frontier {
        ord: entry,
        score: entry_score,
    });

    while let Some(&top) = frontier.peek() {
        let worst = w.peek_worst_score().unwrap_or(f32::NEG_INFINITY);
        if top.score < worst {
            break;
        }
        let u = frontier.pop().expect("peeked above");

        let Some(neighbors) = view.neighbor_list(u.ord) else {
            continue;
        };
        for (v, _) in neighbors.snapshot() {
            if visited.get(v) {
                continue;
            }
            visited.set(v);
            let score = score_of(v);
            let worst_now = w.peek_worst_score().unwrap_or(f32::NEG_INFINITY);
            if !w.is_full() || score > worst_now {
                if w.push(v, score) {
                    frontier.push(Frontier { ord: v, score });
                }
            }
        }
    }

    let mut results = w.top_k(top_k);
    if rerank {
        for (ord, score) in results.iter_mut() {
            if let Some(raw) = view.vector_at(*ord) {
                *score = safe_score(similarity, query, raw);
            }
        }
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.cmp(&a.0))
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor_list::NeighborList;
    use std::sync::Arc;

    fn linear_graph(points: &[f32]) -> GraphStore {
        // One node per point, chained neighbor lists so the searcher can walk the line.
        let graph = GraphStore::new(Similarity::Euclidean, 4, 1);
        let mut ords = Vec::new();
        for &p in points {
            ords.push(graph.allocate_node(&[p]).unwrap());
        }
        for (i, &ord) in ords.iter().enumerate() {
            let mut links = Vec::new();
            if i > 0 {
                links.push(ords[i - 1]);
            }
            if i + 1 < ords.len() {
                links.push(ords[i + 1]);
            }
            let owner = [points[i]];
            let scored: Vec<(u32, f32)> = links
                .iter()
                .map(|&n| {
                    let other = [points[n as usize]];
                    (n, Similarity::Euclidean.score(&owner, &other))
                })
                .collect();
            let nl: Arc<NeighborList> = graph.neighbor_list_arc(ord).unwrap();
            nl.set(scored);
            graph.publish(ord).unwrap();
        }
        graph.try_set_entry_point_if_empty(ords[0]);
        graph
    }

    #[test]
    fn finds_nearest_along_a_line() {
        let graph = linear_graph(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let results = search(&graph, &[4.1], 1, 8).unwrap();
        assert_eq!(results[0].0, 4);
    }

    #[test]
    fn pq_accelerated_search_finds_nearest_along_a_line() {
        let graph = linear_graph(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut pq = crate::pq::ProductQuantizer::new(1, 1, false).unwrap();
        let codebook: Vec<f32> = (0..crate::pq::CODEBOOK_SIZE).map(|k| k as f32).collect();
        pq.load_trained(None, vec![codebook]).unwrap();
        let codes: Vec<Vec<u8>> = (0u8..6).map(|i| vec![i]).collect();

        let results = search_pq(&graph, &pq, &codes, &[4.1], 1, 8, true).unwrap();
        assert_eq!(results[0].0, 4);
    }

    #[test]
    fn empty_graph_errors() {
        let graph = GraphStore::new(Similarity::Euclidean, 4, 2);
        let err = search(&graph, &[1.0, 2.0], 1, 4).unwrap_err();
        assert!(matches!(err, IndexError::EmptyGraph));
    }

    #[test]
    fn respects_top_k() {
        let graph = linear_graph(&[0.0, 1.0, 2.0, 3.0]);
        let results = search(&graph, &[0.0], 2, 8).unwrap();
        assert_eq!(results.len(), 2);
    }
}
