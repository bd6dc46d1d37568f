//! Probe-vs-gallery matching: 1:1 verification and 1:N identification.
//!
//! Both paths are exhaustive scans over every embedding on file. At this
//! system's scale (low tens of thousands of embeddings) an exact scan is
//! preferred over an approximate index: the best match is always the true
//! best match and ties resolve reproducibly.

use crate::distance::{self, DistanceError};
use crate::types::{Embedding, IdentityRecord, MatchResult};

/// Strategy for comparing a probe embedding against enrolled identities.
///
/// Implementors supply the metric; verification and identification are
/// derived from it and share its error contract.
pub trait Matcher {
    /// Distance between two embeddings. Lower = more similar.
    fn distance(&self, a: &Embedding, b: &Embedding) -> Result<f32, DistanceError>;

    /// Minimum distance from `probe` to any embedding in `record`.
    ///
    /// Returns `None` for a record with no embeddings (equivalent to the
    /// record not existing; the store never persists one).
    fn best_distance(
        &self,
        probe: &Embedding,
        record: &IdentityRecord,
    ) -> Result<Option<f32>, DistanceError> {
        let mut best: Option<f32> = None;
        for reference in &record.embeddings {
            let d = self.distance(probe, reference)?;
            if best.map_or(true, |b| d < b) {
                best = Some(d);
            }
        }
        Ok(best)
    }

    /// 1:1 check: does `probe` match this specific claimed identity?
    ///
    /// The minimum distance across the record's reference embeddings is
    /// compared against `threshold`. On a miss the distance is still
    /// reported, with `identity_id` kept, so callers can log near-misses
    /// per identity.
    fn verify(
        &self,
        probe: &Embedding,
        record: &IdentityRecord,
        threshold: f32,
    ) -> Result<MatchResult, DistanceError> {
        let Some(d_min) = self.best_distance(probe, record)? else {
            return Ok(MatchResult::no_match());
        };

        Ok(MatchResult {
            matched: d_min <= threshold,
            identity_id: Some(record.identity_id.clone()),
            distance: Some(d_min),
            display_name: record.display_name.clone(),
        })
    }

    /// 1:N search: which enrolled identity, if any, does `probe` best match?
    ///
    /// Best match wins: among all identities under threshold, the one with
    /// the globally smallest minimum distance is selected, never the first
    /// one enumerated. Exact numeric ties resolve by lexicographic
    /// `identity_id` so the result is reproducible regardless of gallery
    /// order. An empty gallery is a normal non-match, not an error.
    fn identify<'a, I>(
        &self,
        probe: &Embedding,
        records: I,
        threshold: f32,
    ) -> Result<MatchResult, DistanceError>
    where
        I: IntoIterator<Item = &'a IdentityRecord>,
    {
        let mut best: Option<(f32, &IdentityRecord)> = None;

        for record in records {
            let Some(d_min) = self.best_distance(probe, record)? else {
                continue;
            };

            let is_better = match best {
                None => true,
                Some((best_d, best_record)) => {
                    d_min < best_d
                        || (d_min == best_d && record.identity_id < best_record.identity_id)
                }
            };
            if is_better {
                best = Some((d_min, record));
            }
        }

        match best {
            Some((d_min, record)) if d_min <= threshold => {
                tracing::debug!(
                    identity_id = %record.identity_id,
                    distance = d_min,
                    "identify: match"
                );
                Ok(MatchResult {
                    matched: true,
                    identity_id: Some(record.identity_id.clone()),
                    distance: Some(d_min),
                    display_name: record.display_name.clone(),
                })
            }
            Some((d_min, _)) => {
                tracing::debug!(best_distance = d_min, threshold, "identify: no match");
                Ok(MatchResult {
                    matched: false,
                    identity_id: None,
                    distance: Some(d_min),
                    display_name: None,
                })
            }
            None => Ok(MatchResult::no_match()),
        }
    }
}

/// Euclidean-distance matcher over dlib-style face encodings.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn distance(&self, a: &Embedding, b: &Embedding) -> Result<f32, DistanceError> {
        distance::euclidean(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, embeddings: Vec<Vec<f32>>) -> IdentityRecord {
        IdentityRecord {
            identity_id: id.to_string(),
            display_name: Some(format!("{id} name")),
            embeddings: embeddings.into_iter().map(Embedding::new).collect(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_verify_exact_match_distance_zero() {
        let probe = Embedding::new(vec![0.1, 0.2, 0.3]);
        let rec = record("alice", vec![vec![0.1, 0.2, 0.3]]);

        let result = EuclideanMatcher.verify(&probe, &rec, 0.6).unwrap();
        assert!(result.matched);
        assert_eq!(result.identity_id.as_deref(), Some("alice"));
        assert_eq!(result.distance, Some(0.0));
    }

    #[test]
    fn test_verify_uses_closest_reference() {
        // Second reference shot is the close one; min distance must win.
        let probe = Embedding::new(vec![1.0, 0.0]);
        let rec = record("alice", vec![vec![5.0, 5.0], vec![1.0, 0.1]]);

        let result = EuclideanMatcher.verify(&probe, &rec, 0.5).unwrap();
        assert!(result.matched);
        assert!((result.distance.unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_verify_miss_still_reports_distance() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let rec = record("alice", vec![vec![3.0, 4.0]]);

        let result = EuclideanMatcher.verify(&probe, &rec, 0.6).unwrap();
        assert!(!result.matched);
        assert_eq!(result.identity_id.as_deref(), Some("alice"));
        assert!((result.distance.unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_identify_best_match_wins() {
        // Probe at distance 0.3 from A, 0.5 from B; both under 0.6.
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![record("b", vec![vec![0.5]]), record("a", vec![vec![0.3]])];

        let result = EuclideanMatcher.identify(&probe, &gallery, 0.6).unwrap();
        assert!(result.matched);
        assert_eq!(result.identity_id.as_deref(), Some("a"));
        assert!((result.distance.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_identify_all_over_threshold() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![record("a", vec![vec![0.3]]), record("b", vec![vec![0.5]])];

        let result = EuclideanMatcher.identify(&probe, &gallery, 0.2).unwrap();
        assert!(!result.matched);
        assert!(result.identity_id.is_none());
        // Best distance still reported for near-miss logging.
        assert!((result.distance.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_identify_exact_tie_lexicographic() {
        let probe = Embedding::new(vec![0.0]);
        // Both identities tied at exactly 0.4, in either enumeration order.
        let forward = vec![record("carol", vec![vec![0.4]]), record("bob", vec![vec![0.4]])];
        let reverse = vec![record("bob", vec![vec![0.4]]), record("carol", vec![vec![0.4]])];

        for gallery in [forward, reverse] {
            let result = EuclideanMatcher.identify(&probe, &gallery, 0.6).unwrap();
            assert!(result.matched);
            assert_eq!(result.identity_id.as_deref(), Some("bob"));
        }
    }

    #[test]
    fn test_identify_empty_gallery() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = EuclideanMatcher.identify(&probe, &[], 0.6).unwrap();
        assert!(!result.matched);
        assert!(result.identity_id.is_none());
        assert!(result.distance.is_none());
    }

    #[test]
    fn test_identify_dimension_mismatch_propagates() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![record("a", vec![vec![1.0, 0.0, 0.0]])];
        assert!(EuclideanMatcher.identify(&probe, &gallery, 0.6).is_err());
    }
}
