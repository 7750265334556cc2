//! Graph store: ordinal-addressed nodes, entry-point tracking, and
//! publication (component C6).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::error::{IndexError, Result};
use crate::neighbor_list::NeighborList;
use crate::provider::{VectorProvider, VectorStore};
use crate::similarity::Similarity;

struct GraphInner {
    vectors: VectorStore,
    nodes: Vec<Arc<NeighborList>>,
    published: Vec<AtomicBool>,
}

/// Ordinal-addressed set of nodes plus the single entry point every search
/// starts from.
///
/// `vectors` and `nodes` live behind one [`parking_lot::RwLock`] so
/// `allocate_node` keeps them in lock-step; per-node neighbor mutation goes
/// through each node's own [`NeighborList`] lock instead, acquired only
/// while already holding this outer lock for reads (outer-then-inner, never
/// the reverse, to avoid deadlock per the concurrency model).
pub struct GraphStore {
    similarity: Similarity,
    m: usize,
    inner: RwLock<GraphInner>,
    entry_point: Mutex<Option<u32>>,
    published_count: AtomicU32,
}

impl GraphStore {
    pub fn new(similarity: Similarity, m: usize, dimension: usize) -> Self {
        Self {
            similarity,
            m,
            inner: RwLock::new(GraphInner {
                vectors: VectorStore::new(dimension),
                nodes: Vec::new(),
                published: Vec::new(),
            }),
            entry_point: Mutex::new(None),
            published_count: AtomicU32::new(0),
        }
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn dimension(&self) -> usize {
        self.inner.read().vectors.dimension()
    }

    /// Reserve the next ordinal and store `vector`. The node is not visible
    /// to searches until [`GraphStore::publish`] is called.
    pub fn allocate_node(&self, vector: &[f32]) -> Result<u32> {
        let mut guard = self.inner.write();
        guard.vectors.push(vector)?;
        let ord = (guard.nodes.len()) as u32;
        guard.nodes.push(Arc::new(NeighborList::new(self.m)));
        guard.published.push(AtomicBool::new(false));
        Ok(ord)
    }

    /// Mark `ord` visible to concurrent searches.
    pub fn publish(&self, ord: u32) -> Result<()> {
        let guard = self.inner.read();
        let flag = guard
            .published
            .get(ord as usize)
            .ok_or(IndexError::OrdinalOutOfRange(ord))?;
        flag.store(true, Ordering::Release);
        drop(guard);
        self.published_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn is_published(&self, ord: u32) -> bool {
        self.inner
            .read()
            .published
            .get(ord as usize)
            .map(|f| f.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Number of allocated nodes, published or not.
    pub fn allocated_len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Number of published nodes, the `size` exposed to callers.
    pub fn size(&self) -> usize {
        self.published_count.load(Ordering::Acquire) as usize
    }

    pub fn entry(&self) -> Option<u32> {
        *self.entry_point.lock()
    }

    /// If no entry point has ever been set, set it to `ord` and report
    /// success. Used for the very first insertion into an empty graph.
    pub fn try_set_entry_point_if_empty(&self, ord: u32) -> bool {
        let mut guard = self.entry_point.lock();
        if guard.is_none() {
            *guard = Some(ord);
            true
        } else {
            false
        }
    }

    /// Force the entry point during deserialization, bypassing the
    /// empty-graph check (the wire format carries an explicit entry point).
    pub fn force_set_entry(&self, ord: u32) {
        *self.entry_point.lock() = Some(ord);
    }

    /// Promote `candidate` to entry point if its score to the current entry
    /// beats the current entry's own best neighbor score. The whole
    /// read-compare-write sequence runs under the entry-point mutex, so
    /// concurrent promotions serialize and readers never see a torn value.
    pub fn maybe_promote_entry(&self, candidate: u32, candidate_score_to_entry: f32) {
        let mut guard = self.entry_point.lock();
        match *guard {
            None => *guard = Some(candidate),
            Some(current) => {
                let current_best = self
                    .neighbor_list_arc(current)
                    .and_then(|nl| nl.snapshot().first().map(|&(_, s)| s))
                    .unwrap_or(0.0);
                if candidate_score_to_entry > current_best {
                    *guard = Some(candidate);
                }
            }
        }
    }

    pub fn neighbor_list_arc(&self, ord: u32) -> Option<Arc<NeighborList>> {
        self.inner.read().nodes.get(ord as usize).cloned()
    }

    /// A read-locked view exposing [`VectorProvider`] and neighbor-list
    /// access for the duration of a search or build step.
    pub fn read(&self) -> GraphView<'_> {
        GraphView {
            guard: self.inner.read(),
        }
    }
}

/// A snapshot view held under the graph's read lock.
pub struct GraphView<'a> {
    guard: RwLockReadGuard<'a, GraphInner>,
}

impl VectorProvider for GraphView<'_> {
    fn size(&self) -> usize {
        self.guard.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.guard.vectors.dimension()
    }

    fn vector_at(&self, ordinal: u32) -> Option<&[f32]> {
        self.guard.vectors.vector_at(ordinal)
    }
}

impl GraphView<'_> {
    pub fn neighbor_list(&self, ord: u32) -> Option<Arc<NeighborList>> {
        self.guard.nodes.get(ord as usize).cloned()
    }

    pub fn is_published(&self, ord: u32) -> bool {
        self.guard
            .published
            .get(ord as usize)
            .map(|f| f.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}
