//! Error types for the graph index and PQ codec.

use thiserror::Error;

/// Errors that can occur while configuring, building, searching, or
/// (de)serializing an index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    /// A vector's length didn't match the index dimension.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A configuration value was out of its valid range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An ordinal was requested that doesn't exist (or isn't yet published).
    #[error("ordinal {0} is out of range")]
    OrdinalOutOfRange(u32),

    /// Search was attempted before any vector was inserted.
    #[error("search on an empty graph")]
    EmptyGraph,

    /// The serialized stream was malformed, truncated, or had a bad magic/version.
    #[error("corrupt stream: {0}")]
    SerializationCorrupt(String),

    /// PQ training was given fewer samples than the codebook size `K`.
    #[error("insufficient training samples: need at least {needed}, got {got}")]
    TrainingInsufficient { needed: usize, got: usize },

    /// Underlying I/O failure while reading or writing a stream.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
