//! Enrollment guard: duplicate-safe registration of new identities.

use std::sync::Arc;

use rollcall_embeddings::matcher::validate_threshold;
use rollcall_embeddings::{EmbeddingError, EmbeddingStore, FaceScan, Matcher};
use tracing::{debug, error, info};

use crate::durable::DurableStore;
use crate::error::{EnrollmentError, StorageError};
use crate::model::Identity;

/// Admits new identities into the embedding store.
///
/// The id check, the duplicate check and the reservation happen under the
/// store's writer lock, so concurrent enrollments of one person cannot both
/// succeed. The durable write happens after the lock is released; the store
/// only publishes the new entry once that write succeeds.
pub struct EnrollmentGuard {
    store: Arc<EmbeddingStore>,
    durable: Arc<dyn DurableStore>,
    matcher: Matcher,
    tolerance: f32,
}

impl EnrollmentGuard {
    /// Create a guard rejecting faces within `tolerance` of an enrolled one.
    pub fn new(
        store: Arc<EmbeddingStore>,
        durable: Arc<dyn DurableStore>,
        matcher: Matcher,
        tolerance: f32,
    ) -> rollcall_embeddings::Result<Self> {
        validate_threshold(tolerance)?;
        Ok(Self {
            store,
            durable,
            matcher,
            tolerance,
        })
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Enroll `identity` with the single face in `scan`.
    pub async fn try_enroll(
        &self,
        identity: &Identity,
        scan: &FaceScan,
    ) -> Result<(), EnrollmentError> {
        let candidate = match (scan.face_count(), scan.primary()) {
            (1, Some(face)) => face,
            (0, _) | (_, None) => return Err(EnrollmentError::NoFaceDetected),
            (faces, _) => return Err(EnrollmentError::AmbiguousImage { faces }),
        };
        if identity.id.trim().is_empty() {
            return Err(EnrollmentError::InvalidIdentity(identity.id.clone()));
        }

        let reservation = {
            let writer = self.store.lock();
            if writer.is_known(&identity.id) {
                return Err(EnrollmentError::AlreadyRegisteredId {
                    id: identity.id.clone(),
                });
            }

            let view = writer.view();
            if let Some(existing_id) = self
                .matcher
                .contains_duplicate(&view, candidate, self.tolerance)
                .map_err(EnrollmentError::Matching)?
            {
                debug!(
                    "Enrollment of {} matches enrolled identity {existing_id}",
                    identity.id
                );
                return Err(EnrollmentError::DuplicatePerson { existing_id });
            }

            writer
                .reserve(identity.id.clone(), candidate.clone())
                .map_err(|e| match e {
                    EmbeddingError::DuplicateId(id) => EnrollmentError::AlreadyRegisteredId { id },
                    EmbeddingError::InvalidIdentity(id) => EnrollmentError::InvalidIdentity(id),
                    other => EnrollmentError::Matching(other),
                })?
        };

        match self
            .durable
            .persist_enrollment(identity, reservation.embedding())
            .await
        {
            Ok(()) => {}
            Err(StorageError::Conflict(id)) => {
                reservation.rollback();
                return Err(EnrollmentError::AlreadyRegisteredId { id });
            }
            Err(e) => {
                reservation.rollback();
                return Err(EnrollmentError::PersistenceFailure(e));
            }
        }

        if let Err(e) = reservation.commit() {
            // Only possible if the store was reloaded mid-enrollment.
            error!(
                "Enrollment of {} persisted but could not be published: {e}",
                identity.id
            );
            return Err(EnrollmentError::Matching(e));
        }

        info!("Enrolled identity {}", identity.id);
        Ok(())
    }
}
