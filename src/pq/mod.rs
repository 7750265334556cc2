//! Product Quantization: codebook training, encoding, and asymmetric
//! distance scoring (component C9).

mod codec;
mod kmeans;

pub use codec::{ProductQuantizer, CODEBOOK_SIZE};
