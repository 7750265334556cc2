//! Product Quantization codec: training, encoding, and asymmetric distance
//! tables (component C9).
//!
//! Grounded on the upstream `ProductQuantizer` (subspace partition + per-
//! subspace codebook, `quantize`/`approximate_distance`), generalized from a
//! single cosine-only distance to the three named [`Similarity`] metrics and
//! from an exact `dimension % num_codebooks == 0` requirement to an explicit
//! partition that lets the final subspace absorb any remainder.

use rand::Rng;

use crate::error::{IndexError, Result};
use crate::pq::kmeans::KMeans;
use crate::similarity::Similarity;

/// Centroids per subspace, fixed by the design (one code byte per subspace).
pub const CODEBOOK_SIZE: usize = 256;

fn even_partition(dimension: usize, m_pq: usize) -> Vec<usize> {
    let base = dimension / m_pq;
    let remainder = dimension % m_pq;
    (0..m_pq)
        .map(|i| if i == m_pq - 1 { base + remainder } else { base })
        .collect()
}

/// A trained (or training-ready) Product Quantization codebook.
#[derive(Clone, Debug)]
pub struct ProductQuantizer {
    dimension: usize,
    m_pq: usize,
    subspace_dims: Vec<usize>,
    subspace_offsets: Vec<usize>,
    global_centroid: Option<Vec<f32>>,
    /// `codebooks[i]` is `256 * subspace_dims[i]` floats, `CODEBOOK_SIZE` rows.
    codebooks: Vec<Vec<f32>>,
}

impl ProductQuantizer {
    /// Build an untrained codec with an even subspace partition (remainder
    /// absorbed by the last subspace).
    pub fn new(dimension: usize, m_pq: usize, centered: bool) -> Result<Self> {
        if dimension == 0 || m_pq == 0 {
            return Err(IndexError::InvalidConfig(
                "dimension and subspace count must be positive".into(),
            ));
        }
        if m_pq > dimension {
            return Err(IndexError::InvalidConfig(
                "subspace count cannot exceed dimension".into(),
            ));
        }
        let subspace_dims = even_partition(dimension, m_pq);
        Self::with_partition(dimension, subspace_dims, centered)
    }

    /// Build an untrained codec with an explicit, possibly uneven, partition.
    pub fn with_partition(dimension: usize, subspace_dims: Vec<usize>, centered: bool) -> Result<Self> {
        if subspace_dims.iter().sum::<usize>() != dimension {
            return Err(IndexError::InvalidConfig(
                "subspace dimensions must partition the full dimension".into(),
            ));
        }
        let mut subspace_offsets = Vec::with_capacity(subspace_dims.len());
        let mut acc = 0;
        for &d in &subspace_dims {
            subspace_offsets.push(acc);
            acc += d;
        }
        Ok(Self {
            dimension,
            m_pq: subspace_dims.len(),
            subspace_dims,
            subspace_offsets,
            global_centroid: if centered {
                Some(vec![0.0; dimension])
            } else {
                None
            },
            codebooks: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn m_pq(&self) -> usize {
        self.m_pq
    }

    pub fn subspace_dims(&self) -> &[usize] {
        &self.subspace_dims
    }

    pub fn global_centroid(&self) -> Option<&[f32]> {
        self.global_centroid.as_deref()
    }

    pub fn is_trained(&self) -> bool {
        !self.codebooks.is_empty()
    }

    /// Codebook for subspace `i`, flat `256 * subspace_dims[i]` floats.
    pub fn codebook(&self, i: usize) -> &[f32] {
        &self.codebooks[i]
    }

    fn centroid<'a>(&'a self, subspace: usize, code: u8) -> &'a [f32] {
        let d = self.subspace_dims[subspace];
        let start = code as usize * d;
        &self.codebooks[subspace][start..start + d]
    }

    fn subtract_global<'a>(&self, vector: &'a [f32], scratch: &'a mut Vec<f32>) -> &'a [f32] {
        match &self.global_centroid {
            Some(g) => {
                scratch.clear();
                scratch.extend(vector.iter().zip(g).map(|(&x, &g)| x - g));
                scratch
            }
            None => vector,
        }
    }

    /// Train codebooks from `n` samples stored back-to-back in `samples`
    /// (each `dimension` floats, SoA layout).
    pub fn fit(&mut self, samples: &[f32], n: usize, rng: &mut impl Rng) -> Result<()> {
        if n < CODEBOOK_SIZE {
            return Err(IndexError::TrainingInsufficient {
                needed: CODEBOOK_SIZE,
                got: n,
            });
        }

        if let Some(global) = &mut self.global_centroid {
            global.iter_mut().for_each(|x| *x = 0.0);
            for i in 0..n {
                let v = &samples[i * self.dimension..(i + 1) * self.dimension];
                for (g, &x) in global.iter_mut().zip(v) {
                    *g += x / n as f32;
                }
            }
        }

        let mut centered_samples;
        let samples = if self.global_centroid.is_some() {
            let global = self.global_centroid.as_ref().unwrap();
            centered_samples = vec![0.0f32; samples.len()];
            for i in 0..n {
                let src = &samples[i * self.dimension..(i + 1) * self.dimension];
                let dst = &mut centered_samples[i * self.dimension..(i + 1) * self.dimension];
                for ((d, &s), &g) in dst.iter_mut().zip(src).zip(global) {
                    *d = s - g;
                }
            }
            &centered_samples[..]
        } else {
            samples
        };

        let mut codebooks = Vec::with_capacity(self.m_pq);
        for sub in 0..self.m_pq {
            let dim = self.subspace_dims[sub];
            let offset = self.subspace_offsets[sub];
            let mut flat = Vec::with_capacity(n * dim);
            for i in 0..n {
                let full = &samples[i * self.dimension..(i + 1) * self.dimension];
                flat.extend_from_slice(&full[offset..offset + dim]);
            }
            let mut km = KMeans::new(dim, CODEBOOK_SIZE);
            km.fit(&flat, n, rng)?;
            codebooks.push(km.into_flat());
        }
        self.codebooks = codebooks;
        Ok(())
    }

    /// Encode a single raw vector into `m_pq` centroid indices.
    pub fn encode(&self, vector: &[f32]) -> Result<Vec<u8>> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if !self.is_trained() {
            return Err(IndexError::InvalidConfig(
                "codec has not been trained".into(),
            ));
        }
        let mut scratch = Vec::new();
        let centered = self.subtract_global(vector, &mut scratch);

        let mut codes = Vec::with_capacity(self.m_pq);
        for sub in 0..self.m_pq {
            let dim = self.subspace_dims[sub];
            let offset = self.subspace_offsets[sub];
            let sub_vec = &centered[offset..offset + dim];
            let mut best_code = 0u8;
            let mut best_dist = f32::INFINITY;
            for code in 0..CODEBOOK_SIZE {
                let dist = crate::simd::l2_squared(sub_vec, self.centroid(sub, code as u8));
                if dist < best_dist {
                    best_dist = dist;
                    best_code = code as u8;
                }
            }
            codes.push(best_code);
        }
        Ok(codes)
    }

    /// Install codebooks (and optional global centroid) read back from the
    /// wire format, bypassing `fit`. Caller is responsible for the shapes
    /// matching the partition the codec was constructed with.
    pub(crate) fn load_trained(&mut self, global_centroid: Option<Vec<f32>>, codebooks: Vec<Vec<f32>>) -> Result<()> {
        if codebooks.len() != self.m_pq {
            return Err(IndexError::SerializationCorrupt(format!(
                "expected {} codebooks, got {}",
                self.m_pq,
                codebooks.len()
            )));
        }
        for (sub, book) in codebooks.iter().enumerate() {
            if book.len() != CODEBOOK_SIZE * self.subspace_dims[sub] {
                return Err(IndexError::SerializationCorrupt(format!(
                    "codebook {sub} has wrong length"
                )));
            }
        }
        self.global_centroid = global_centroid;
        self.codebooks = codebooks;
        Ok(())
    }

    /// Decode the centroid for a single (subspace, code) pair — used by the
    /// idempotence check (`encode(decode(code)) == code`) and by rerank paths
    /// that need an approximate raw vector.
    pub fn decode_centroid(&self, subspace: usize, code: u8) -> &[f32] {
        self.centroid(subspace, code)
    }

    /// Precompute a `m_pq x 256` asymmetric distance table for `query`.
    pub fn build_distance_table(&self, query: &[f32], similarity: Similarity) -> Result<Vec<Vec<f32>>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let mut scratch = Vec::new();
        let centered = self.subtract_global(query, &mut scratch);

        let mut table = Vec::with_capacity(self.m_pq);
        for sub in 0..self.m_pq {
            let dim = self.subspace_dims[sub];
            let offset = self.subspace_offsets[sub];
            let q_sub = &centered[offset..offset + dim];
            let mut row = Vec::with_capacity(CODEBOOK_SIZE);
            for code in 0..CODEBOOK_SIZE {
                let c = self.centroid(sub, code as u8);
                let v = match similarity {
                    Similarity::Euclidean => crate::simd::l2_squared(q_sub, c),
                    Similarity::DotProduct | Similarity::Cosine => crate::simd::dot(q_sub, c),
                };
                row.push(v);
            }
            table.push(row);
        }
        Ok(table)
    }

    /// Combine a precomputed table with a code sequence into a final score
    /// in the same `(0, 1]` space as [`Similarity::score`].
    pub fn score_with_table(table: &[Vec<f32>], codes: &[u8], similarity: Similarity) -> f32 {
        let raw: f32 = table
            .iter()
            .zip(codes)
            .map(|(row, &code)| row[code as usize])
            .sum();
        match similarity {
            Similarity::Euclidean => 1.0 / (1.0 + raw),
            Similarity::DotProduct | Similarity::Cosine => (1.0 + raw) / 2.0,
        }
    }
}

impl PartialEq for ProductQuantizer {
    fn eq(&self, other: &Self) -> bool {
        self.m_pq == other.m_pq
            && self.subspace_dims == other.subspace_dims
            && self.global_centroid == other.global_centroid
            && self.codebooks == other.codebooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn random_samples(n: usize, dim: usize, rng: &mut impl Rng) -> Vec<f32> {
        (0..n * dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    #[test]
    fn encode_produces_one_byte_per_subspace() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let samples = random_samples(300, 8, &mut rng);
        let mut pq = ProductQuantizer::new(8, 4, false).unwrap();
        pq.fit(&samples, 300, &mut rng).unwrap();
        let codes = pq.encode(&samples[0..8]).unwrap();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn idempotent_on_decoded_centroids() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let samples = random_samples(300, 6, &mut rng);
        let mut pq = ProductQuantizer::new(6, 3, false).unwrap();
        pq.fit(&samples, 300, &mut rng).unwrap();
        for sub in 0..3 {
            for code in [0u8, 1, 42] {
                let centroid = pq.decode_centroid(sub, code).to_vec();
                let dim = pq.subspace_dims()[sub];
                let mut full = vec![0.0f32; pq.dimension()];
                let offset = pq.subspace_offsets[sub];
                full[offset..offset + dim].copy_from_slice(&centroid);
                let re_encoded = pq.encode(&full).unwrap();
                assert_eq!(re_encoded[sub], code);
            }
        }
    }

    #[test]
    fn rejects_bad_partition() {
        let err = ProductQuantizer::with_partition(8, vec![3, 4], false).unwrap_err();
        assert!(matches!(err, IndexError::InvalidConfig(_)));
    }

    #[test]
    fn equality_requires_identical_codebooks() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let samples = random_samples(300, 4, &mut rng);
        let mut a = ProductQuantizer::new(4, 2, false).unwrap();
        a.fit(&samples, 300, &mut rng).unwrap();
        let b = a.clone();
        assert_eq!(a, b);
    }
}
