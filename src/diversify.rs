//! RobustPrune-style neighbor diversification (component 4.8).
//!
//! Grounded in the RND/RRND selection strategies from the upstream HNSW
//! construction module, generalized to an explicit `alpha` and phrased
//! directly over [`Similarity`] scores rather than a single hard-coded
//! cosine distance.

use crate::provider::VectorProvider;
use crate::similarity::Similarity;

/// `1 - score` is a monotone-decreasing stand-in for "distance": since every
/// [`Similarity::score`] lies in `(0, 1]` and increases with similarity,
/// this preserves the ordering RobustPrune's pruning rule depends on
/// regardless of which of the three metrics is active.
#[inline]
fn dist(similarity: Similarity, a: &[f32], b: &[f32]) -> f32 {
    1.0 - similarity.score(a, b)
}

/// Select at most `m` neighbors for `owner_vector` out of `candidates`
/// (ordinal, score-to-owner pairs), using alpha-parameterized RobustPrune.
///
/// `alpha >= 1.0` controls density: `1.0` is strict RNG pruning, larger
/// values (~1.2 typical, DiskANN recommends up to 1.2-1.5) admit more,
/// less-aggressively-pruned neighbors.
///
/// Candidates referencing an ordinal the `provider` can't resolve are
/// skipped — this can only happen if the caller passed a stale candidate,
/// since by construction every candidate comes from an already-published
/// node.
pub fn diversify(
    owner_vector: &[f32],
    candidates: &[(u32, f32)],
    m: usize,
    provider: &dyn VectorProvider,
    similarity: Similarity,
    alpha: f32,
) -> Vec<(u32, f32)> {
    if candidates.is_empty() || m == 0 {
        return Vec::new();
    }

    let mut sorted: Vec<(u32, f32)> = candidates.to_vec();
    // Best score first; among ties, lower ordinal first (reproducible builds).
    sorted.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let mut selected: Vec<(u32, f32)> = Vec::with_capacity(m);

    for &(cand_ord, cand_score) in &sorted {
        if selected.len() >= m {
            break;
        }
        let Some(cand_vec) = provider.vector_at(cand_ord) else {
            continue;
        };
        let d_c_u = dist(similarity, cand_vec, owner_vector);

        let mut keep = true;
        for &(sel_ord, _) in &selected {
            let Some(sel_vec) = provider.vector_at(sel_ord) else {
                continue;
            };
            let d_c_s = dist(similarity, cand_vec, sel_vec);
            if alpha * d_c_s <= d_c_u {
                keep = false;
                break;
            }
        }

        if keep {
            selected.push((cand_ord, cand_score));
        }
    }

    selected
}
