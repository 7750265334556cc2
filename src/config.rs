//! Builder configuration and validation (part of the external builder
//! surface, §6).

use crate::error::{IndexError, Result};
use crate::similarity::Similarity;

pub const MIN_M: u16 = 2;
pub const MAX_M: u16 = 512;

/// Configuration for a [`crate::builder::Builder`].
#[derive(Clone, Copy, Debug)]
pub struct BuilderConfig {
    pub dimension: u16,
    pub similarity: Similarity,
    /// Maximum neighbor-list size (graph degree).
    pub m: u16,
    /// Beam width used during insertion.
    pub ef_construction: u16,
    /// RobustPrune density parameter, `>= 1.0`.
    pub alpha: f32,
}

impl BuilderConfig {
    pub fn new(dimension: u16, similarity: Similarity, m: u16, ef_construction: u16, alpha: f32) -> Result<Self> {
        let config = Self {
            dimension,
            similarity,
            m,
            ef_construction,
            alpha,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(IndexError::InvalidConfig("dimension must be positive".into()));
        }
        if !(MIN_M..=MAX_M).contains(&self.m) {
            return Err(IndexError::InvalidConfig(format!(
                "M must be in [{MIN_M}, {MAX_M}], got {}",
                self.m
            )));
        }
        if self.ef_construction < self.m {
            return Err(IndexError::InvalidConfig(format!(
                "ef_construction ({}) must be >= M ({})",
                self.ef_construction, self.m
            )));
        }
        if !(self.alpha >= 1.0) {
            return Err(IndexError::InvalidConfig(format!(
                "alpha must be >= 1.0, got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}
