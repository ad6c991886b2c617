//! Nearest-neighbor matching over a store snapshot.
//!
//! Both recognition and duplicate detection use the same euclidean metric
//! and, by default, the same threshold, so there is one number to tune.

use serde::{Deserialize, Serialize};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{distances, euclidean_distance};
use crate::store::Snapshot;

/// Default maximum distance (exclusive) for a best match to count as a
/// recognition.
pub const DEFAULT_RECOGNITION_THRESHOLD: f32 = 0.5;

/// Default maximum distance (inclusive) at which an enrollment is treated as
/// a person already in the store.
pub const DEFAULT_DUPLICATE_TOLERANCE: f32 = 0.5;

/// Outcome of a best-match lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    /// No stored embedding is close enough.
    NoMatch,
    /// The closest stored embedding is under the threshold.
    Match { identity_id: String, distance: f32 },
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Stateless matcher configured with a recognition threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    recognition_threshold: f32,
}

impl Matcher {
    /// Create a matcher with the given recognition threshold.
    pub fn new(recognition_threshold: f32) -> Result<Self> {
        validate_threshold(recognition_threshold)?;
        Ok(Self {
            recognition_threshold,
        })
    }

    pub fn recognition_threshold(&self) -> f32 {
        self.recognition_threshold
    }

    /// Find the closest stored embedding and accept it if its distance is
    /// strictly below the recognition threshold.
    ///
    /// Ties go to the entry registered first.
    pub fn nearest(&self, snapshot: &Snapshot, query: &Embedding) -> Result<MatchResult> {
        check_dimension(snapshot, query)?;

        let mut best: Option<(usize, f32)> = None;
        for (index, candidate) in snapshot.embeddings().iter().enumerate() {
            let distance = euclidean_distance(candidate, query)?;
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((index, distance));
            }
        }

        let Some((index, distance)) = best else {
            return Ok(MatchResult::NoMatch);
        };
        if distance >= self.recognition_threshold {
            return Ok(MatchResult::NoMatch);
        }

        match snapshot.identity_at(index) {
            Some(identity_id) => Ok(MatchResult::Match {
                identity_id: identity_id.to_string(),
                distance,
            }),
            None => Ok(MatchResult::NoMatch),
        }
    }

    /// Report the first stored identity whose embedding lies within
    /// `tolerance` of `query`.
    ///
    /// This is a threshold test, not a best-match test: the first hit in
    /// snapshot order wins even if a closer one follows.
    pub fn contains_duplicate(
        &self,
        snapshot: &Snapshot,
        query: &Embedding,
        tolerance: f32,
    ) -> Result<Option<String>> {
        validate_threshold(tolerance)?;
        check_dimension(snapshot, query)?;

        for (identity_id, candidate) in snapshot.iter() {
            if euclidean_distance(candidate, query)? <= tolerance {
                return Ok(Some(identity_id.to_string()));
            }
        }
        Ok(None)
    }

    /// Distance from `query` to every stored embedding, in snapshot order.
    pub fn distances(&self, snapshot: &Snapshot, query: &Embedding) -> Result<Vec<f32>> {
        check_dimension(snapshot, query)?;
        distances(query, snapshot.embeddings().iter().map(Embedding::as_slice))
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            recognition_threshold: DEFAULT_RECOGNITION_THRESHOLD,
        }
    }
}

/// Reject negative, NaN and infinite thresholds.
pub fn validate_threshold(value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EmbeddingError::InvalidThreshold { value });
    }
    Ok(())
}

fn check_dimension(snapshot: &Snapshot, query: &Embedding) -> Result<()> {
    if query.len() != snapshot.dimension() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: snapshot.dimension(),
            actual: query.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec()).unwrap()
    }

    fn snapshot(entries: &[(&str, &[f32])]) -> Snapshot {
        let dimension = entries.first().map_or(2, |(_, v)| v.len());
        Snapshot::from_pairs(
            dimension,
            entries
                .iter()
                .map(|(id, values)| ((*id).to_string(), emb(values))),
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_empty_snapshot() {
        let result = Matcher::default()
            .nearest(&Snapshot::empty(2), &emb(&[0.1, 0.2]))
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[test]
    fn test_nearest_reflexive() {
        let snap = snapshot(&[("a", &[0.9, 0.1]), ("b", &[0.2, 0.3]), ("c", &[0.0, 1.0])]);
        for (id, stored) in snap.iter() {
            let result = Matcher::default().nearest(&snap, stored).unwrap();
            assert_eq!(
                result,
                MatchResult::Match {
                    identity_id: id.to_string(),
                    distance: 0.0
                }
            );
        }
    }

    #[test]
    fn test_nearest_picks_closest() {
        let snap = snapshot(&[("far", &[0.4, 0.0]), ("near", &[0.1, 0.0])]);
        let result = Matcher::default().nearest(&snap, &emb(&[0.0, 0.0])).unwrap();
        match result {
            MatchResult::Match {
                identity_id,
                distance,
            } => {
                assert_eq!(identity_id, "near");
                assert!((distance - 0.1).abs() < 1e-6);
            }
            MatchResult::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_nearest_ties_go_to_first_registered() {
        let snap = snapshot(&[("first", &[0.0, 0.2]), ("second", &[0.2, 0.0])]);
        let result = Matcher::default().nearest(&snap, &emb(&[0.0, 0.0])).unwrap();
        assert!(matches!(result, MatchResult::Match { identity_id, .. } if identity_id == "first"));
    }

    #[test]
    fn test_nearest_threshold_is_exclusive() {
        let snap = snapshot(&[("a", &[0.5, 0.0])]);
        let query = emb(&[0.0, 0.0]);
        assert_eq!(
            Matcher::default().nearest(&snap, &query).unwrap(),
            MatchResult::NoMatch
        );
        assert!(
            Matcher::new(0.51)
                .unwrap()
                .nearest(&snap, &query)
                .unwrap()
                .is_match()
        );
    }

    #[test]
    fn test_nearest_dimension_mismatch() {
        let snap = snapshot(&[("a", &[0.1, 0.2])]);
        let err = Matcher::default()
            .nearest(&snap, &emb(&[0.1, 0.2, 0.3]))
            .unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_contains_duplicate_reports_first_within_tolerance() {
        let snap = snapshot(&[
            ("a", &[1.0, 1.0]),
            ("b", &[0.3, 0.0]),
            ("c", &[0.1, 0.0]),
        ]);
        let hit = Matcher::default()
            .contains_duplicate(&snap, &emb(&[0.0, 0.0]), 0.5)
            .unwrap();
        assert_eq!(hit, Some("b".to_string()));
    }

    #[test]
    fn test_contains_duplicate_zero_tolerance_needs_identical_vector() {
        let snap = snapshot(&[("a", &[0.25, 0.5])]);
        let matcher = Matcher::default();

        assert_eq!(
            matcher
                .contains_duplicate(&snap, &emb(&[0.25, 0.5]), 0.0)
                .unwrap(),
            Some("a".to_string())
        );
        assert_eq!(
            matcher
                .contains_duplicate(&snap, &emb(&[0.25, 0.500_001]), 0.0)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_contains_duplicate_zero_tolerance_tiny_difference() {
        let snap = snapshot(&[("a", &[0.0, 0.0])]);
        assert_eq!(
            Matcher::default()
                .contains_duplicate(&snap, &emb(&[1e-23, 0.0]), 0.0)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_contains_duplicate_zero_tolerance_signed_zero() {
        // Signed zeros collapse on construction, so a hit means the stored
        // and queried vectors are bit-identical.
        let snap = snapshot(&[("a", &[0.0])]);
        let query = emb(&[-0.0]);
        let stored = snap.get("a").unwrap();

        assert_eq!(query[0].to_bits(), stored[0].to_bits());
        assert_eq!(
            Matcher::default()
                .contains_duplicate(&snap, &query, 0.0)
                .unwrap(),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_contains_duplicate_rejects_negative_tolerance() {
        let snap = snapshot(&[("a", &[0.0, 0.0])]);
        assert!(matches!(
            Matcher::default().contains_duplicate(&snap, &emb(&[0.0, 0.0]), -0.1),
            Err(EmbeddingError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_distances_in_snapshot_order() {
        let snap = snapshot(&[("a", &[3.0, 4.0]), ("b", &[0.0, 0.0])]);
        let d = Matcher::default()
            .distances(&snap, &emb(&[0.0, 0.0]))
            .unwrap();
        assert_eq!(d, vec![5.0, 0.0]);
    }

    #[test]
    fn test_matcher_rejects_invalid_threshold() {
        assert!(Matcher::new(f32::NAN).is_err());
        assert!(Matcher::new(-1.0).is_err());
        assert_eq!(Matcher::new(0.6).unwrap().recognition_threshold(), 0.6);
    }
}
