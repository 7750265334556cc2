//! Brute-force recall and ef-monotonicity over random data.
//!
//! Mirrors the design's stated recall law: approximate search should track
//! brute force closely, and widening the beam should never hurt recall.

use vamana_pq::{Builder, BuilderConfig, Similarity};

fn lcg_vector(seed: u64, dim: usize) -> Vec<f32> {
    let mut state = seed;
    (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

fn brute_force_top_k(vectors: &[Vec<f32>], query: &[f32], k: usize, similarity: Similarity) -> Vec<u32> {
    let mut scored: Vec<(u32, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32, similarity.score(query, v)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(b.0.cmp(&a.0)));
    scored.into_iter().take(k).map(|(o, _)| o).collect()
}

#[test]
fn search_tracks_brute_force_on_random_cosine_data() {
    const N: usize = 2000;
    const DIM: usize = 64;
    const K: usize = 10;

    let config = BuilderConfig::new(DIM as u16, Similarity::Cosine, 16, 64, 1.2).unwrap();
    let builder = Builder::new(config).unwrap();

    let mut vectors = Vec::with_capacity(N);
    for i in 0..N {
        let v = lcg_vector((i as u64) * 2654435761 + 1, DIM);
        builder.insert(&v).unwrap();
        vectors.push(v);
    }

    let queries: Vec<Vec<f32>> = (0..20).map(|i| lcg_vector(900_000 + i, DIM)).collect();
    let mut total_overlap = 0usize;
    for q in &queries {
        let approx = builder.search(q, K, 100).unwrap();
        let approx_ords: std::collections::HashSet<u32> = approx.iter().map(|&(o, _)| o).collect();
        let exact = brute_force_top_k(&vectors, q, K, Similarity::Cosine);
        let overlap = exact.iter().filter(|o| approx_ords.contains(o)).count();
        total_overlap += overlap;
    }
    let recall = total_overlap as f64 / (queries.len() * K) as f64;
    assert!(recall >= 0.9, "recall {recall} below 0.9");
}

#[test]
fn widening_ef_search_does_not_reduce_recall() {
    const N: usize = 1000;
    const DIM: usize = 32;
    const K: usize = 10;

    let config = BuilderConfig::new(DIM as u16, Similarity::Euclidean, 16, 32, 1.2).unwrap();
    let builder = Builder::new(config).unwrap();
    let mut vectors = Vec::with_capacity(N);
    for i in 0..N {
        let v = lcg_vector((i as u64) * 982_451_653 + 7, DIM);
        builder.insert(&v).unwrap();
        vectors.push(v);
    }

    let queries: Vec<Vec<f32>> = (0..15).map(|i| lcg_vector(1_500_000 + i, DIM)).collect();

    let recall_at = |ef: usize| -> f64 {
        let mut overlap = 0usize;
        for q in &queries {
            let approx = builder.search(q, K, ef).unwrap();
            let approx_ords: std::collections::HashSet<u32> = approx.iter().map(|&(o, _)| o).collect();
            let exact = brute_force_top_k(&vectors, q, K, Similarity::Euclidean);
            overlap += exact.iter().filter(|o| approx_ords.contains(o)).count();
        }
        overlap as f64 / (queries.len() * K) as f64
    };

    let recall_narrow = recall_at(20);
    let recall_wide = recall_at(200);
    assert!(
        recall_wide >= recall_narrow - 1e-9,
        "widening ef_search regressed recall: {recall_narrow} -> {recall_wide}"
    );
}
