//! An in-memory Vamana/DiskANN-style proximity graph for approximate
//! nearest-neighbor search, with an optional Product Quantization codec for
//! compressed distance scoring.
//!
//! The graph supports incremental concurrent insertion: [`Builder::insert`]
//! searches the currently-published subset of the graph, diversifies the
//! result with RobustPrune, and writes both the new node's forward edges and
//! the matching back-links, all without a global write lock. [`Builder::search`]
//! is a lock-free (read-locked) best-first beam search over the same
//! structure.
//!
//! ```
//! use vamana_pq::{Builder, BuilderConfig, Similarity};
//!
//! let config = BuilderConfig::new(3, Similarity::Cosine, 16, 64, 1.2).unwrap();
//! let builder = Builder::new(config).unwrap();
//! builder.insert(&[1.0, 0.0, 0.0]).unwrap();
//! builder.insert(&[0.0, 1.0, 0.0]).unwrap();
//! let results = builder.search(&[0.9, 0.1, 0.0], 1, 32).unwrap();
//! assert_eq!(results[0].0, 0);
//! ```

mod bitset;
mod builder;
mod candidates;
mod config;
mod diversify;
mod error;
mod graph;
mod neighbor_list;
mod pq;
mod provider;
mod search;
mod serialize;
mod similarity;
mod simd;

pub use builder::Builder;
pub use config::{BuilderConfig, MAX_M, MIN_M};
pub use error::{IndexError, Result};
pub use graph::{GraphStore, GraphView};
pub use pq::{ProductQuantizer, CODEBOOK_SIZE};
pub use provider::{normalize, pq_brute_force_top_k, CompressedVectorProvider, PqCodeStore, VectorProvider, VectorStore};
pub use serialize::{read_graph, read_pq, write_graph, write_pq};
pub use similarity::Similarity;
