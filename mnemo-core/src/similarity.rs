//! Cosine similarity over embedding vectors

/// Cosine similarity between two vectors
///
/// Returns 0.0 for mismatched lengths, empty input, or zero-magnitude
/// vectors. Identical vectors score 1.0, opposite vectors -1.0, orthogonal
/// vectors 0.0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1e-6;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3, -1.2, 4.0, 0.07];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let v = vec![1.0, 2.0, 3.0];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < TOLERANCE);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert!(cosine_similarity(&[1.0, 2.0], &[1.0]).abs() < TOLERANCE);
        assert!(cosine_similarity(&[], &[]).abs() < TOLERANCE);
    }

    #[test]
    fn zero_magnitude_scores_zero() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < TOLERANCE);
    }
}
