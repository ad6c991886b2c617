//! Durable storage collaborator.
//!
//! The engine keeps its authoritative runtime cache in memory; a
//! [`DurableStore`] seeds that cache at startup and records every
//! enrollment and attendance event.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rollcall_embeddings::Embedding;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::model::{AttendanceRecord, EnrolledFace, Identity};

/// Trait for durable stores.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Get the name of this store.
    fn name(&self) -> &str;

    /// Every enrolled (identity id, embedding) pair, in enrollment order.
    async fn scan_embeddings(&self) -> StorageResult<Vec<(String, Embedding)>>;

    /// Persist a new identity and its embedding.
    ///
    /// Either both are stored or neither is. Fails with
    /// [`StorageError::Conflict`] if the id is already persisted.
    async fn persist_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
    ) -> StorageResult<()>;

    /// Display name for an enrolled identity.
    async fn display_name(&self, identity_id: &str) -> StorageResult<Option<String>>;

    /// Append an attendance record.
    async fn record_attendance(&self, record: &AttendanceRecord) -> StorageResult<()>;
}

#[derive(Default)]
struct MemoryState {
    faces: Vec<EnrolledFace>,
    positions: HashMap<String, usize>,
    attendance: Vec<AttendanceRecord>,
}

/// Durable store kept entirely in memory. Data is lost on restart.
#[derive(Default)]
pub struct MemoryDurableStore {
    state: RwLock<MemoryState>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All attendance records, oldest first.
    pub async fn attendance(&self) -> Vec<AttendanceRecord> {
        self.state.read().await.attendance.clone()
    }

    /// All enrolled faces, in enrollment order.
    pub async fn faces(&self) -> Vec<EnrolledFace> {
        self.state.read().await.faces.clone()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn scan_embeddings(&self) -> StorageResult<Vec<(String, Embedding)>> {
        let state = self.state.read().await;
        Ok(state
            .faces
            .iter()
            .map(|face| (face.identity.id.clone(), face.embedding.clone()))
            .collect())
    }

    async fn persist_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.positions.contains_key(&identity.id) {
            return Err(StorageError::Conflict(identity.id.clone()));
        }

        let position = state.faces.len();
        state.positions.insert(identity.id.clone(), position);
        state.faces.push(EnrolledFace {
            identity: identity.clone(),
            embedding: embedding.clone(),
            enrolled_at: Utc::now(),
        });
        debug!("Persisted enrollment for {}", identity.id);
        Ok(())
    }

    async fn display_name(&self, identity_id: &str) -> StorageResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .get(identity_id)
            .map(|&i| state.faces[i].identity.display_name()))
    }

    async fn record_attendance(&self, record: &AttendanceRecord) -> StorageResult<()> {
        self.state.write().await.attendance.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_enrollment_round_trip() {
        let store = MemoryDurableStore::new();
        store
            .persist_enrollment(&Identity::new("S001", "Ada", "Lovelace"), &emb(&[0.1, 0.2]))
            .await
            .unwrap();

        let pairs = store.scan_embeddings().await.unwrap();
        assert_eq!(pairs, vec![("S001".to_string(), emb(&[0.1, 0.2]))]);
        assert_eq!(
            store.display_name("S001").await.unwrap(),
            Some("Ada Lovelace".to_string())
        );
        assert_eq!(store.display_name("S999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_conflict() {
        let store = MemoryDurableStore::new();
        let identity = Identity::new("S001", "Ada", "Lovelace");
        store
            .persist_enrollment(&identity, &emb(&[0.1]))
            .await
            .unwrap();

        let err = store
            .persist_enrollment(&identity, &emb(&[0.9]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(id) if id == "S001"));
        assert_eq!(store.faces().await.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_appends_attendance() {
        let store = MemoryDurableStore::new();
        let record = AttendanceRecord::present("S001", Utc::now());
        store.record_attendance(&record).await.unwrap();
        store.record_attendance(&record).await.unwrap();
        assert_eq!(store.attendance().await, vec![record.clone(), record]);
    }
}
