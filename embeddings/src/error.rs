//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Dimension mismatch between a vector and the store it is used against.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector is empty or contains non-finite components.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Identity id is empty.
    #[error("invalid identity id: {0:?}")]
    InvalidIdentity(String),

    /// Identity already present in the store or awaiting commit.
    #[error("identity already present in store: {0}")]
    DuplicateId(String),

    /// The store cannot be replaced while enrollments are in flight.
    #[error("store has {count} pending reservations")]
    PendingReservations { count: usize },

    /// Invalid matching threshold.
    #[error("invalid threshold {value}: must be finite and non-negative")]
    InvalidThreshold { value: f32 },

    /// Face embedder request failed.
    #[error("embedder request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from the face embedder.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether this error indicates a data or configuration bug rather than
    /// a collaborator failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::InvalidThreshold { .. }
                | Self::InvalidIdentity(_)
                | Self::DuplicateId(_)
                | Self::PendingReservations { .. }
        )
    }
}
