//! Error types for enrollment, recognition and the attendance engine.

use rollcall_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for durable store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors reported by a durable store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backing store cannot be reached.
    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    /// The identity is already persisted.
    #[error("identity already persisted: {0}")]
    Conflict(String),

    /// Stored data could not be interpreted.
    #[error("corrupt durable data: {0}")]
    Corrupt(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad class of an enrollment failure, used to pick how it is surfaced
/// and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Zero or several faces, or a malformed identity. A normal negative
    /// result.
    InputRejection,
    /// The id or the person is already enrolled.
    StateConflict,
    /// Durable store or face embedder failed.
    CollaboratorFailure,
    /// Dimension mismatch or similar configuration bug.
    ProgrammingError,
}

/// Reasons an enrollment is refused.
#[derive(Error, Debug)]
pub enum EnrollmentError {
    /// No face in the image.
    #[error("No face detected in the image. Please try again.")]
    NoFaceDetected,

    /// More than one face in the image.
    #[error("Multiple faces detected. Please ensure only one person is in the frame.")]
    AmbiguousImage { faces: usize },

    /// Identity id is empty.
    #[error("invalid identity id: {0:?}")]
    InvalidIdentity(String),

    /// The identity id is already enrolled.
    #[error("Student ID {id} is already registered.")]
    AlreadyRegisteredId { id: String },

    /// The face is already enrolled under another id.
    #[error("This person is already registered as {existing_id}.")]
    DuplicatePerson { existing_id: String },

    /// The durable write failed; nothing was enrolled.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[source] StorageError),

    /// The face embedder failed.
    #[error("face embedder failure: {0}")]
    Embedder(#[source] EmbeddingError),

    /// The enrollment transaction did not finish in time.
    #[error("enrollment timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Matching could not run, e.g. a dimension mismatch.
    #[error("matching error: {0}")]
    Matching(#[source] EmbeddingError),
}

impl EnrollmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFaceDetected | Self::AmbiguousImage { .. } | Self::InvalidIdentity(_) => {
                ErrorKind::InputRejection
            }
            Self::AlreadyRegisteredId { .. } | Self::DuplicatePerson { .. } => {
                ErrorKind::StateConflict
            }
            Self::PersistenceFailure(_) | Self::Timeout { .. } => ErrorKind::CollaboratorFailure,
            Self::Embedder(e) if e.is_programming_error() => ErrorKind::ProgrammingError,
            Self::Embedder(_) => ErrorKind::CollaboratorFailure,
            Self::Matching(_) => ErrorKind::ProgrammingError,
        }
    }
}

/// Errors that can occur while configuring or running the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Durable store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_enrollment_messages() {
        assert_eq!(
            EnrollmentError::NoFaceDetected.to_string(),
            "No face detected in the image. Please try again."
        );
        assert_eq!(
            EnrollmentError::AmbiguousImage { faces: 3 }.to_string(),
            "Multiple faces detected. Please ensure only one person is in the frame."
        );
        assert_eq!(
            EnrollmentError::AlreadyRegisteredId {
                id: "S001".to_string()
            }
            .to_string(),
            "Student ID S001 is already registered."
        );
        assert_eq!(
            EnrollmentError::DuplicatePerson {
                existing_id: "S001".to_string()
            }
            .to_string(),
            "This person is already registered as S001."
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EnrollmentError::NoFaceDetected.kind(),
            ErrorKind::InputRejection
        );
        assert_eq!(
            EnrollmentError::AmbiguousImage { faces: 2 }.kind(),
            ErrorKind::InputRejection
        );
        assert_eq!(
            EnrollmentError::DuplicatePerson {
                existing_id: "S001".to_string()
            }
            .kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            EnrollmentError::PersistenceFailure(StorageError::Unavailable("down".to_string()))
                .kind(),
            ErrorKind::CollaboratorFailure
        );
        assert_eq!(
            EnrollmentError::Matching(EmbeddingError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
            .kind(),
            ErrorKind::ProgrammingError
        );
        assert_eq!(
            EnrollmentError::Embedder(EmbeddingError::ApiRequest("503".to_string())).kind(),
            ErrorKind::CollaboratorFailure
        );
    }
}
