//! Euclidean distance over embedding vectors.
//!
//! The reference metric for dlib-style 128-dim face encodings: symmetric,
//! zero on identical inputs, monotonically increasing with dissimilarity.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistanceError {
    #[error("embedding dimension mismatch: {a} vs {b} — extractor versions must not be mixed")]
    DimensionMismatch { a: usize, b: usize },
}

/// Euclidean distance between two embeddings.
///
/// A single extractor version always produces one fixed length, but the
/// contract is checked rather than assumed: an extractor upgrade that
/// changes dimensionality must surface here, not silently zip-truncate.
pub fn euclidean(a: &Embedding, b: &Embedding) -> Result<f32, DistanceError> {
    if a.dim() != b.dim() {
        return Err(DistanceError::DimensionMismatch {
            a: a.dim(),
            b: b.dim(),
        });
    }

    let sum: f32 = a
        .values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum();

    Ok(sum.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = emb(&[0.3, -1.2, 4.5, 0.0]);
        assert_eq!(euclidean(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = emb(&[1.0, 2.0, 3.0]);
        let b = emb(&[-0.5, 0.25, 8.0]);
        assert_eq!(euclidean(&a, &b).unwrap(), euclidean(&b, &a).unwrap());
    }

    #[test]
    fn test_distance_known_value() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((euclidean(&a, &b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = emb(&[1.0, 2.0]);
        let b = emb(&[1.0, 2.0, 3.0]);
        assert_eq!(
            euclidean(&a, &b),
            Err(DistanceError::DimensionMismatch { a: 2, b: 3 })
        );
    }
}
