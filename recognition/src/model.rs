//! Records exchanged with the durable store.

use chrono::{DateTime, Utc};
use rollcall_embeddings::Embedding;
use serde::{Deserialize, Serialize};

/// An enrolled person.
///
/// Only `id` takes part in matching; the names are display attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Identity {
    /// Create an identity. Surrounding whitespace is trimmed from every field.
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into().trim().to_string(),
            first_name: first_name.into().trim().to_string(),
            last_name: last_name.into().trim().to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// An identity together with the embedding it was enrolled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledFace {
    #[serde(flatten)]
    pub identity: Identity,
    pub embedding: Embedding,
    pub enrolled_at: DateTime<Utc>,
}

/// Attendance status. Only presence is recorded today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Present,
}

/// One attendance log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// A presence record for `identity_id` at `timestamp`.
    pub fn present(identity_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            identity_id: identity_id.into(),
            timestamp,
            status: AttendanceStatus::Present,
        }
    }
}
