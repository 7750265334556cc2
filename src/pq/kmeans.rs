//! Per-subspace k-means used to train a [`super::ProductQuantizer`] codebook.
//!
//! Distance inside k-means is always Euclidean, independent of whatever
//! similarity the surrounding index uses — grounded on the upstream SCANN
//! partitioning k-means, generalized from cosine to Euclidean distance and
//! from a 100-iteration cap down to a small fixed cap suited to a
//! per-subspace 256-centroid codebook rather than a coarse top-level
//! partition.

use rand::Rng;

use crate::error::{IndexError, Result};
use crate::simd;

const MAX_ITERATIONS: usize = 15;
const CONVERGENCE_EPSILON: f32 = 1e-6;

/// Flat-storage k-means over `dimension`-wide vectors, producing `k` centroids.
pub struct KMeans {
    dimension: usize,
    k: usize,
    centroids: Vec<f32>,
}

impl KMeans {
    pub fn new(dimension: usize, k: usize) -> Self {
        Self {
            dimension,
            k,
            centroids: Vec::new(),
        }
    }

    /// Train on `n` vectors stored back-to-back in `vectors` (SoA layout).
    pub fn fit(&mut self, vectors: &[f32], n: usize, rng: &mut impl Rng) -> Result<()> {
        if n < self.k {
            return Err(IndexError::TrainingInsufficient {
                needed: self.k,
                got: n,
            });
        }

        self.centroids = self.kmeans_plus_plus(vectors, n, rng);

        for _ in 0..MAX_ITERATIONS {
            let assignments = self.assign(vectors, n);
            let updated = self.recompute_centroids(vectors, n, &assignments);

            let mut converged = true;
            for c in 0..self.k {
                let old = self.centroid(c);
                let new = &updated[c * self.dimension..(c + 1) * self.dimension];
                if simd::l2_squared(old, new) > CONVERGENCE_EPSILON {
                    converged = false;
                    break;
                }
            }

            self.centroids = updated;
            if converged {
                break;
            }
        }

        Ok(())
    }

    fn kmeans_plus_plus(&self, vectors: &[f32], n: usize, rng: &mut impl Rng) -> Vec<f32> {
        let get = |idx: usize| &vectors[idx * self.dimension..(idx + 1) * self.dimension];

        let mut centroids = Vec::with_capacity(self.k * self.dimension);
        let first = rng.gen_range(0..n);
        centroids.extend_from_slice(get(first));

        let mut min_sq_dist = vec![f32::INFINITY; n];
        for _ in 1..self.k {
            let last = &centroids[centroids.len() - self.dimension..];
            let mut total = 0.0f64;
            for (i, d) in min_sq_dist.iter_mut().enumerate() {
                let dist = simd::l2_squared(get(i), last);
                if dist < *d {
                    *d = dist;
                }
                total += *d as f64;
            }

            if total <= 0.0 {
                centroids.extend_from_slice(get(rng.gen_range(0..n)));
                continue;
            }

            let threshold = rng.gen::<f64>() * total;
            let mut cumulative = 0.0f64;
            let mut chosen = n - 1;
            for (i, &d) in min_sq_dist.iter().enumerate() {
                cumulative += d as f64;
                if cumulative >= threshold {
                    chosen = i;
                    break;
                }
            }
            centroids.extend_from_slice(get(chosen));
        }

        centroids
    }

    fn assign(&self, vectors: &[f32], n: usize) -> Vec<usize> {
        let get = |idx: usize| &vectors[idx * self.dimension..(idx + 1) * self.dimension];
        (0..n)
            .map(|i| {
                let v = get(i);
                (0..self.k)
                    .map(|c| (c, simd::l2_squared(v, self.centroid(c))))
                    .fold((0usize, f32::INFINITY), |best, (c, d)| {
                        if d < best.1 {
                            (c, d)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect()
    }

    fn recompute_centroids(&self, vectors: &[f32], n: usize, assignments: &[usize]) -> Vec<f32> {
        let get = |idx: usize| &vectors[idx * self.dimension..(idx + 1) * self.dimension];
        let mut sums = vec![0.0f32; self.k * self.dimension];
        let mut counts = vec![0usize; self.k];

        for i in 0..n {
            let c = assignments[i];
            counts[c] += 1;
            let v = get(i);
            let row = &mut sums[c * self.dimension..(c + 1) * self.dimension];
            for (s, &x) in row.iter_mut().zip(v.iter()) {
                *s += x;
            }
        }

        for c in 0..self.k {
            let row = &mut sums[c * self.dimension..(c + 1) * self.dimension];
            if counts[c] > 0 {
                for s in row.iter_mut() {
                    *s /= counts[c] as f32;
                }
            } else {
                // Empty cluster: keep the previous centroid rather than collapsing to zero.
                row.copy_from_slice(self.centroid(c));
            }
        }

        sums
    }

    pub fn centroid(&self, idx: usize) -> &[f32] {
        &self.centroids[idx * self.dimension..(idx + 1) * self.dimension]
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.centroids
    }
}
