//! Cosine similarity between embedding vectors.

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SimilarityError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot compare a zero-norm vector")]
    DegenerateVector,
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity of `a` and `b`, i.e. `1 - cosine_distance(a, b)`.
///
/// The result is clamped to `[-1, 1]`. Vectors of different length, or
/// with a norm below `f32::EPSILON`, are rejected.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return Err(SimilarityError::DegenerateVector);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-5;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.3, -1.2, 4.5, 0.0];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        let x = [1.0, 0.0];
        let y = [0.0, 1.0];
        let neg_x = [-1.0, 0.0];

        assert!(cosine_similarity(&x, &y).unwrap().abs() < TOLERANCE);
        assert!((cosine_similarity(&x, &neg_x).unwrap() + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_scale_invariant() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_symmetric() {
        let a = [0.2, 0.7, -0.1];
        let b = [0.9, -0.3, 0.4];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_range_is_bounded() {
        let vectors = [
            vec![1e-3, 5.0, -2.0],
            vec![-7.0, 0.5, 0.5],
            vec![3.3, 3.3, 3.3],
            vec![1e6, -1e6, 1.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let score = cosine_similarity(a, b).unwrap();
                assert!((-1.0..=1.0).contains(&score));
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]);
        assert_eq!(
            result,
            Err(SimilarityError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
    }

    #[test]
    fn test_zero_vector_rejected() {
        assert_eq!(
            cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]),
            Err(SimilarityError::DegenerateVector)
        );
        assert_eq!(
            cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]),
            Err(SimilarityError::DegenerateVector)
        );
    }
}
