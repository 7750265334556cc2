//! Concurrent, bounded, diversified neighbor list attached to each graph
//! node (component C5).

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::diversify::diversify;
use crate::provider::VectorProvider;
use crate::similarity::Similarity;

/// Most nodes in a bounded-degree graph hold close to the same number of
/// neighbors, so a few entries live inline before spilling to the heap.
const INLINE_NEIGHBORS: usize = 32;

/// A single node's outgoing edges: `(ordinal, score-to-owner)` pairs, kept
/// sorted best-first, capped at `capacity` and diversified on every write.
///
/// Guarded by its own lock so that concurrent inserts into disjoint nodes
/// never contend, and a writer touching one node's list never blocks a
/// reader traversing a different node's. Callers that also hold the graph
/// store's outer lock must take it before this one — outer, then inner,
/// never the reverse — to avoid deadlock.
#[derive(Debug)]
pub struct NeighborList {
    capacity: usize,
    inner: RwLock<SmallVec<[(u32, f32); INLINE_NEIGHBORS]>>,
}

impl NeighborList {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(SmallVec::new()),
        }
    }

    /// A point-in-time, best-first copy of the held neighbors.
    pub fn snapshot(&self) -> Vec<(u32, f32)> {
        self.inner.read().to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Merge `new_candidates` into the existing list and re-diversify down
    /// to `capacity`, under a single write-lock hold so concurrent readers
    /// never see a partially-updated list.
    ///
    /// `owner_vector` and `owner_ordinal` identify the node this list
    /// belongs to; `new_candidates` must not already contain `owner_ordinal`
    /// (a node is never its own neighbor).
    pub fn insert_diverse(
        &self,
        owner_ordinal: u32,
        owner_vector: &[f32],
        new_candidates: &[(u32, f32)],
        provider: &dyn VectorProvider,
        similarity: Similarity,
        alpha: f32,
    ) {
        let mut guard = self.inner.write();
        let mut pool: Vec<(u32, f32)> = guard.iter().copied().collect();
        for &(ord, score) in new_candidates {
            if ord != owner_ordinal && !pool.iter().any(|&(o, _)| o == ord) {
                pool.push((ord, score));
            }
        }
        let diversified = diversify(owner_vector, &pool, self.capacity, provider, similarity, alpha);
        *guard = diversified.into_iter().collect();
    }

    /// Unconditionally replace the held neighbors (used for the initial
    /// write during construction, where there is nothing to merge with).
    pub fn set(&self, neighbors: Vec<(u32, f32)>) {
        let mut guard = self.inner.write();
        *guard = neighbors.into_iter().take(self.capacity).collect();
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::VectorStore;

    fn store_with(points: &[[f32; 1]]) -> VectorStore {
        let mut store = VectorStore::new(1);
        for p in points {
            store.push(p).unwrap();
        }
        store
    }

    #[test]
    fn insert_diverse_respects_capacity() {
        let store = store_with(&[[1.0], [2.0], [3.0], [4.0], [5.0]]);
        let list = NeighborList::new(2);
        let owner = [0.0f32];
        let candidates: Vec<(u32, f32)> = (0..5)
            .map(|i| {
                let v = store.vector_at(i).unwrap();
                (i, Similarity::Euclidean.score(&owner, v))
            })
            .collect();
        list.insert_diverse(99, &owner, &candidates, &store, Similarity::Euclidean, 1.2);
        assert!(list.len() <= 2);
    }

    #[test]
    fn set_then_snapshot_roundtrips() {
        let list = NeighborList::new(4);
        list.set(vec![(1, 0.9), (2, 0.5)]);
        assert_eq!(list.snapshot(), vec![(1, 0.9), (2, 0.5)]);
    }

    #[test]
    fn insert_diverse_merges_with_existing() {
        let store = store_with(&[[1.0], [2.0], [3.0]]);
        let list = NeighborList::new(2);
        let owner = [0.0f32];
        list.set(vec![(0, Similarity::Euclidean.score(&owner, &[1.0]))]);
        list.insert_diverse(
            99,
            &owner,
            &[(2, Similarity::Euclidean.score(&owner, &[3.0]))],
            &store,
            Similarity::Euclidean,
            1.2,
        );
        let snap = list.snapshot();
        assert!(snap.len() <= 2);
        assert!(snap.iter().any(|&(o, _)| o == 0));
    }
}
