//! # Embeddings
//!
//! This crate holds the face embedding cache and the nearest-neighbor
//! matching engine used by rollcall.
//!
//! ## Features
//!
//! - **Embedding Store**: Process-wide cache of enrolled face embeddings
//! - **Matching**: Euclidean best-match and duplicate detection
//! - **Face Embedders**: Adapters for the external face embedding model
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  FaceEmbedder ──► FaceScan ──► Embedding ──► EmbeddingStore    │
//! │                                    │              │             │
//! │                                    ▼              ▼             │
//! │                                 Matcher ◄──── Snapshot         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod matcher;
pub mod provider;
pub mod similarity;
pub mod store;

pub use error::{EmbeddingError, Result};
pub use matcher::{
    DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_RECOGNITION_THRESHOLD, MatchResult, Matcher,
};
pub use provider::{FaceEmbedder, FaceScan, HttpFaceEmbedder, JsonFaceEmbedder};
pub use similarity::euclidean_distance;
pub use store::{EmbeddingStore, Reservation, Snapshot, StoreStats, StoreWriter};

/// Dimension of face embeddings produced by the usual face models.
pub const DEFAULT_DIMENSION: usize = 128;

/// A dense face embedding.
///
/// The vector is immutable once built and shares its buffer between clones,
/// so snapshots can copy it freely.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Arc<[f32]>);

impl Embedding {
    /// Create an embedding, rejecting empty vectors and non-finite components.
    ///
    /// Negative zero is stored as positive zero, so two embeddings at
    /// distance zero always have identical bits.
    pub fn new(mut values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(EmbeddingError::InvalidEmbedding(
                "embedding has no components".to_string(),
            ));
        }
        if let Some(position) = values.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidEmbedding(format!(
                "component {position} is not finite"
            )));
        }
        for value in &mut values {
            if *value == 0.0 {
                *value = 0.0;
            }
        }
        Ok(Self(values.into()))
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Deref for Embedding {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0.to_vec()
    }
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding")
            .field("dimension", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_embedding_rejects_empty() {
        assert!(matches!(
            Embedding::new(Vec::new()),
            Err(EmbeddingError::InvalidEmbedding(_))
        ));
    }

    #[test]
    fn test_embedding_rejects_non_finite() {
        assert!(Embedding::new(vec![0.0, f32::NAN]).is_err());
        assert!(Embedding::new(vec![f32::INFINITY]).is_err());
    }

    #[test]
    fn test_embedding_normalizes_negative_zero() {
        let embedding = Embedding::new(vec![-0.0, 0.5]).unwrap();
        assert_eq!(embedding[0].to_bits(), 0.0_f32.to_bits());
        assert_eq!(embedding, Embedding::new(vec![0.0, 0.5]).unwrap());
    }

    #[test]
    fn test_embedding_serializes_as_array() {
        let embedding = Embedding::new(vec![0.25, -1.0]).unwrap();
        let json = serde_json::to_string(&embedding).unwrap();
        assert_eq!(json, "[0.25,-1.0]");

        let parsed: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, embedding);
        assert!(serde_json::from_str::<Embedding>("[]").is_err());
    }
}
