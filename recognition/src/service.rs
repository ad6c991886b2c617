//! Recognition service: resolve a captured face to an enrolled identity.

use std::sync::Arc;

use rollcall_embeddings::{EmbeddingStore, FaceScan, MatchResult, Matcher, Result, Snapshot};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of matching a capture against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttendanceOutcome {
    /// The image contained no face.
    NoFaceDetected,
    /// No enrolled face is close enough.
    NotRecognized,
    /// The capture matches an enrolled identity.
    Recognized { identity_id: String, distance: f32 },
}

/// Read-only best-match lookups over the embedding store.
///
/// Never writes to the store or to durable storage; recording attendance is
/// left to the caller.
pub struct RecognitionService {
    store: Arc<EmbeddingStore>,
    matcher: Matcher,
}

impl RecognitionService {
    pub fn new(store: Arc<EmbeddingStore>, matcher: Matcher) -> Self {
        Self { store, matcher }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Match the first face of `scan` against the current snapshot.
    pub fn recognize(&self, scan: &FaceScan) -> Result<AttendanceOutcome> {
        self.recognize_in(&self.store.snapshot(), scan)
    }

    /// Match the first face of `scan` against `snapshot`.
    ///
    /// Callers that need to inspect the store alongside the outcome take one
    /// snapshot and use it for both.
    pub fn recognize_in(
        &self,
        snapshot: &Snapshot,
        scan: &FaceScan,
    ) -> Result<AttendanceOutcome> {
        let Some(candidate) = scan.primary() else {
            return Ok(AttendanceOutcome::NoFaceDetected);
        };
        if scan.face_count() > 1 {
            debug!(
                "Capture has {} faces, matching the first one",
                scan.face_count()
            );
        }

        let outcome = match self.matcher.nearest(snapshot, candidate)? {
            MatchResult::NoMatch => AttendanceOutcome::NotRecognized,
            MatchResult::Match {
                identity_id,
                distance,
            } => AttendanceOutcome::Recognized {
                identity_id,
                distance,
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rollcall_embeddings::{Embedding, EmbeddingError};

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn service_with(entries: &[(&str, &[f32])]) -> RecognitionService {
        let store = Arc::new(EmbeddingStore::new(3));
        for (id, values) in entries {
            store.append(*id, emb(values)).unwrap();
        }
        RecognitionService::new(store, Matcher::default())
    }

    #[test]
    fn test_recognize_empty_store() {
        let service = service_with(&[]);
        let outcome = service
            .recognize(&FaceScan::single(emb(&[0.1, 0.2, 0.3])))
            .unwrap();
        assert_eq!(outcome, AttendanceOutcome::NotRecognized);
    }

    #[test]
    fn test_recognize_exact_match() {
        let service = service_with(&[("S001", &[0.1, 0.2, 0.3])]);
        let outcome = service
            .recognize(&FaceScan::single(emb(&[0.1, 0.2, 0.3])))
            .unwrap();
        assert_eq!(
            outcome,
            AttendanceOutcome::Recognized {
                identity_id: "S001".to_string(),
                distance: 0.0
            }
        );
    }

    #[test]
    fn test_recognize_far_face() {
        let service = service_with(&[("S001", &[0.0, 0.0, 0.0])]);
        let outcome = service
            .recognize(&FaceScan::single(emb(&[0.9, 0.0, 0.0])))
            .unwrap();
        assert_eq!(outcome, AttendanceOutcome::NotRecognized);
    }

    #[test]
    fn test_recognize_no_face_leaves_store_unchanged() {
        let service = service_with(&[("S001", &[0.0, 0.0, 0.0])]);
        let outcome = service.recognize(&FaceScan::default()).unwrap();
        assert_eq!(outcome, AttendanceOutcome::NoFaceDetected);
        assert_eq!(service.store.len(), 1);
    }

    #[test]
    fn test_recognize_uses_first_face() {
        let service = service_with(&[("S001", &[0.0, 0.0, 0.0]), ("S002", &[1.0, 1.0, 1.0])]);
        let outcome = service
            .recognize(&FaceScan::new(vec![
                emb(&[1.0, 1.0, 1.0]),
                emb(&[0.0, 0.0, 0.0]),
            ]))
            .unwrap();
        assert!(
            matches!(outcome, AttendanceOutcome::Recognized { identity_id, .. } if identity_id == "S002")
        );
    }

    #[test]
    fn test_recognize_dimension_mismatch() {
        let service = service_with(&[]);
        assert!(matches!(
            service.recognize(&FaceScan::single(emb(&[0.1, 0.2]))),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_recognize_in_uses_given_snapshot() {
        let service = service_with(&[]);
        let before = service.store.snapshot();
        service.store.append("S001", emb(&[0.1, 0.2, 0.3])).unwrap();

        let scan = FaceScan::single(emb(&[0.1, 0.2, 0.3]));
        assert_eq!(
            service.recognize_in(&before, &scan).unwrap(),
            AttendanceOutcome::NotRecognized
        );
        assert!(matches!(
            service.recognize(&scan).unwrap(),
            AttendanceOutcome::Recognized { .. }
        ));
    }
}
