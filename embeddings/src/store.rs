//! Process-wide cache of enrolled face embeddings.
//!
//! Readers take an [`Arc<Snapshot>`] that is published copy-on-write, so a
//! lookup never blocks and never observes a half-applied append. Writers are
//! serialized through a single lock that is held only for the in-memory
//! critical section. An enrollment that is still waiting on durable storage
//! lives in the store as a [`Reservation`]: later writers see it when they
//! check for duplicates, readers do not see it until it is committed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// A point-in-time view of the store.
///
/// `ids()` and `embeddings()` are positionally aligned and never change once
/// the snapshot has been handed out.
#[derive(Debug, Clone)]
pub struct Snapshot {
    dimension: usize,
    ids: Vec<String>,
    embeddings: Vec<Embedding>,
    positions: HashMap<String, usize>,
}

impl Snapshot {
    /// Create an empty snapshot for vectors of `dimension` components.
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            embeddings: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Build a snapshot from (id, embedding) pairs, keeping their order.
    pub fn from_pairs<I>(dimension: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Embedding)>,
    {
        let mut snapshot = Self::empty(dimension);
        for (id, embedding) in pairs {
            snapshot.push(id, embedding)?;
        }
        Ok(snapshot)
    }

    fn push(&mut self, id: String, embedding: Embedding) -> Result<()> {
        validate_id(&id)?;
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if self.positions.contains_key(&id) {
            return Err(EmbeddingError::DuplicateId(id));
        }

        self.positions.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.embeddings.push(embedding);
        Ok(())
    }

    /// Dimension every embedding in this snapshot has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identity ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Embeddings aligned with [`Snapshot::ids`].
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Look up the embedding enrolled for `id`.
    pub fn get(&self, id: &str) -> Option<&Embedding> {
        self.positions.get(id).map(|&i| &self.embeddings[i])
    }

    /// Identity id stored at `index`.
    pub fn identity_at(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// Iterate over (id, embedding) pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.embeddings.iter())
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(EmbeddingError::InvalidIdentity(id.to_string()));
    }
    Ok(())
}

struct PendingEntry {
    ticket: u64,
    id: String,
    embedding: Embedding,
}

#[derive(Default)]
struct WriterState {
    pending: Vec<PendingEntry>,
    next_ticket: u64,
}

impl WriterState {
    fn remove(&mut self, ticket: u64) {
        self.pending.retain(|entry| entry.ticket != ticket);
    }
}

/// The in-memory embedding store.
pub struct EmbeddingStore {
    /// Expected dimension of embeddings.
    dimension: usize,

    /// Snapshot handed to readers.
    published: ArcSwap<Snapshot>,

    /// Serializes writers; holds reservations awaiting commit.
    writer: Mutex<WriterState>,
}

impl EmbeddingStore {
    /// Create an empty store.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            published: ArcSwap::from_pointee(Snapshot::empty(dimension)),
            writer: Mutex::new(WriterState::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace the entire contents of the store.
    ///
    /// The pairs are validated first; on error the previous contents are
    /// kept. Fails while any reservation is pending, since a loaded id could
    /// shadow it. Returns the number of loaded entries.
    pub fn load<I>(&self, pairs: I) -> Result<usize>
    where
        I: IntoIterator<Item = (String, Embedding)>,
    {
        let snapshot = Snapshot::from_pairs(self.dimension, pairs)?;
        let count = snapshot.len();

        let state = self.lock_writer();
        if !state.pending.is_empty() {
            return Err(EmbeddingError::PendingReservations {
                count: state.pending.len(),
            });
        }
        self.published.store(Arc::new(snapshot));

        info!("Loaded {count} face embeddings into store");
        Ok(count)
    }

    /// Append one pair and publish it immediately.
    pub fn append(&self, id: impl Into<String>, embedding: Embedding) -> Result<()> {
        self.lock().reserve(id, embedding)?.commit()
    }

    /// Current published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }

    /// Take the writer lock.
    ///
    /// The returned handle must not be held across an `.await`; reserve and
    /// drop it before talking to durable storage.
    pub fn lock(&self) -> StoreWriter<'_> {
        let state = self.lock_writer();
        StoreWriter {
            store: self,
            committed: self.published.load_full(),
            state,
        }
    }

    /// Check whether `id` is committed to the store.
    pub fn contains(&self, id: &str) -> bool {
        self.published.load().contains(id)
    }

    pub fn len(&self) -> usize {
        self.published.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.load().is_empty()
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        let pending = self.lock_writer().pending.len();
        StoreStats {
            entries: self.len(),
            pending,
            dimension: self.dimension,
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterState> {
        // The critical sections never leave the state half-updated, so a
        // poisoned lock is still consistent.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive write access to an [`EmbeddingStore`].
pub struct StoreWriter<'a> {
    store: &'a EmbeddingStore,
    committed: Arc<Snapshot>,
    state: MutexGuard<'a, WriterState>,
}

impl<'a> StoreWriter<'a> {
    /// Committed entries followed by pending reservations, in that order.
    ///
    /// This is the view duplicate detection has to run against so that two
    /// enrollments in flight cannot both pass.
    pub fn view(&self) -> Arc<Snapshot> {
        if self.state.pending.is_empty() {
            return Arc::clone(&self.committed);
        }

        let mut view = (*self.committed).clone();
        for entry in &self.state.pending {
            // Reservations are checked against committed and pending ids, and
            // load refuses to run while any exist, so this cannot collide.
            if let Err(e) = view.push(entry.id.clone(), entry.embedding.clone()) {
                debug!("Pending reservation {} left out of view: {e}", entry.id);
            }
        }
        Arc::new(view)
    }

    /// Whether `id` is committed or reserved.
    pub fn is_known(&self, id: &str) -> bool {
        self.committed.contains(id) || self.state.pending.iter().any(|entry| entry.id == id)
    }

    /// Reserve a slot for `id`, releasing the writer lock.
    pub fn reserve(
        mut self,
        id: impl Into<String>,
        embedding: Embedding,
    ) -> Result<Reservation<'a>> {
        let id = id.into();
        validate_id(&id)?;
        if embedding.len() != self.store.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.store.dimension,
                actual: embedding.len(),
            });
        }
        if self.is_known(&id) {
            return Err(EmbeddingError::DuplicateId(id));
        }

        let ticket = self.state.next_ticket;
        self.state.next_ticket += 1;
        self.state.pending.push(PendingEntry {
            ticket,
            id: id.clone(),
            embedding: embedding.clone(),
        });
        debug!("Reserved store slot for {id}");

        Ok(Reservation {
            store: self.store,
            ticket,
            id,
            embedding,
            settled: false,
        })
    }
}

/// An enrollment that passed the duplicate check and awaits its durable
/// write.
///
/// Dropping the reservation without calling [`Reservation::commit`] rolls it
/// back, which also covers futures cancelled by a timeout.
pub struct Reservation<'a> {
    store: &'a EmbeddingStore,
    ticket: u64,
    id: String,
    embedding: Embedding,
    settled: bool,
}

impl Reservation<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    /// Publish the reserved pair to readers.
    pub fn commit(mut self) -> Result<()> {
        let store = self.store;
        let mut state = store.lock_writer();
        state.remove(self.ticket);
        self.settled = true;

        let mut next = (*store.published.load_full()).clone();
        next.push(self.id.clone(), self.embedding.clone())?;
        store.published.store(Arc::new(next));

        debug!("Committed {} to embedding store", self.id);
        Ok(())
    }

    /// Drop the reservation without publishing it.
    pub fn rollback(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.settled {
            return;
        }
        self.store.lock_writer().remove(self.ticket);
        self.settled = true;
        debug!("Rolled back store reservation for {}", self.id);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Statistics about the embedding store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of committed entries.
    pub entries: usize,

    /// Number of reservations awaiting commit.
    pub pending: usize,

    /// Expected embedding dimension.
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_append_visible_in_next_snapshot() {
        let store = EmbeddingStore::new(2);
        store.append("S001", emb(&[0.1, 0.2])).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.ids(), ["S001".to_string()]);
        assert_eq!(snapshot.get("S001"), Some(&emb(&[0.1, 0.2])));
        assert!(store.contains("S001"));
    }

    #[test]
    fn test_snapshot_unchanged_by_later_append() {
        let store = EmbeddingStore::new(2);
        store.append("S001", emb(&[0.1, 0.2])).unwrap();

        let before = store.snapshot();
        store.append("S002", emb(&[0.3, 0.4])).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before.embeddings().len(), 1);
        assert_eq!(store.snapshot().len(), 2);
        assert_eq!(store.snapshot().identity_at(1), Some("S002"));
    }

    #[test]
    fn test_append_rejects_known_id() {
        let store = EmbeddingStore::new(2);
        store.append("S001", emb(&[0.1, 0.2])).unwrap();
        let err = store.append("S001", emb(&[0.9, 0.9])).unwrap_err();
        assert!(matches!(err, EmbeddingError::DuplicateId(id) if id == "S001"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_rejects_wrong_dimension() {
        let store = EmbeddingStore::new(3);
        let err = store.append("S001", emb(&[0.1, 0.2])).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_rejects_blank_id() {
        let store = EmbeddingStore::new(1);
        assert!(matches!(
            store.append("  ", emb(&[0.0])),
            Err(EmbeddingError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_load_replaces_contents() {
        let store = EmbeddingStore::new(1);
        store.append("old", emb(&[0.0])).unwrap();

        let loaded = store
            .load(vec![
                ("a".to_string(), emb(&[1.0])),
                ("b".to_string(), emb(&[2.0])),
            ])
            .unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(store.snapshot().ids(), ["a".to_string(), "b".to_string()]);
        assert!(!store.contains("old"));
    }

    #[test]
    fn test_load_failure_keeps_previous_contents() {
        let store = EmbeddingStore::new(1);
        store.append("keep", emb(&[0.0])).unwrap();

        let result = store.load(vec![
            ("a".to_string(), emb(&[1.0])),
            ("a".to_string(), emb(&[2.0])),
        ]);

        assert!(matches!(result, Err(EmbeddingError::DuplicateId(_))));
        assert_eq!(store.snapshot().ids(), ["keep".to_string()]);
    }

    #[test]
    fn test_load_refused_while_reservation_pending() {
        let store = EmbeddingStore::new(1);
        store.append("keep", emb(&[0.0])).unwrap();
        let reservation = store.lock().reserve("S001", emb(&[0.5])).unwrap();

        let result = store.load(vec![("S001".to_string(), emb(&[0.9]))]);

        assert!(matches!(
            result,
            Err(EmbeddingError::PendingReservations { count: 1 })
        ));
        assert_eq!(store.snapshot().ids(), ["keep".to_string()]);
        assert_eq!(
            store.lock().view().ids(),
            ["keep".to_string(), "S001".to_string()]
        );

        reservation.rollback();
        assert_eq!(
            store
                .load(vec![("S001".to_string(), emb(&[0.9]))])
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_reservation_visible_to_writers_only() {
        let store = EmbeddingStore::new(1);
        let reservation = store.lock().reserve("S001", emb(&[0.5])).unwrap();

        assert!(store.snapshot().is_empty());
        let writer = store.lock();
        assert!(writer.is_known("S001"));
        assert_eq!(writer.view().ids(), ["S001".to_string()]);
        drop(writer);
        assert_eq!(store.stats().pending, 1);

        reservation.commit().unwrap();
        assert_eq!(store.snapshot().ids(), ["S001".to_string()]);
        assert_eq!(
            store.stats(),
            StoreStats {
                entries: 1,
                pending: 0,
                dimension: 1
            }
        );
    }

    #[test]
    fn test_dropped_reservation_rolls_back() {
        let store = EmbeddingStore::new(1);
        {
            let _reservation = store.lock().reserve("S001", emb(&[0.5])).unwrap();
            assert!(store.lock().is_known("S001"));
        }

        assert!(!store.lock().is_known("S001"));
        assert!(store.snapshot().is_empty());
        store.append("S001", emb(&[0.5])).unwrap();
    }

    #[test]
    fn test_second_reservation_for_same_id_rejected() {
        let store = EmbeddingStore::new(1);
        let first = store.lock().reserve("S001", emb(&[0.5])).unwrap();
        assert!(matches!(
            store.lock().reserve("S001", emb(&[0.7])),
            Err(EmbeddingError::DuplicateId(_))
        ));
        first.rollback();
        assert_eq!(store.stats().pending, 0);
    }
}
