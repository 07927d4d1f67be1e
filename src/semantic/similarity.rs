//! Vector math for comparing embeddings.

use crate::semantic::errors::SemanticError;

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = l2_norm(&v);
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Cosine similarity: dot product over the product of both norms.
///
/// Inputs need not be unit length. A zero-norm side scores 0.0.
pub fn cosine_similarity(query: &[f32], target: &[f32]) -> Result<f32, SemanticError> {
    if query.len() != target.len() {
        return Err(SemanticError::DimensionMismatch {
            expected: query.len(),
            got: target.len(),
        });
    }

    let query_norm = l2_norm(query);
    let target_norm = l2_norm(target);
    if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
        return Ok(0.0);
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    Ok(dot_product / (query_norm * target_norm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let v = vec![0.3, 0.4, 0.5];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors_score_zero() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(score.abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors_score_minus_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap();
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unnormalized_vectors_use_true_cosine() {
        // same direction, different magnitudes
        let score = cosine_similarity(&[2.0, 0.0, 0.0], &[10.0, 0.0, 0.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);

        let score = cosine_similarity(&[3.0, 4.0], &[4.0, 3.0]).unwrap();
        assert!((score - 24.0 / 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_scores_zero() {
        let score = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(matches!(
            result,
            Err(SemanticError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_normalize() {
        let v = normalize(vec![3.0, 4.0]);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);

        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
