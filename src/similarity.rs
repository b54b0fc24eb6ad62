/**
 * Similarity Engine
 * Cosine similarity between two feature vectors, clamped to [0, 1]
 */

use crate::error::{NeuroLockError, Result};

/// Norms below this are treated as a null vector.
pub const NORM_EPSILON: f64 = 1e-6;

/// Cosine similarity of `a` and `b`.
///
/// Negative cosines are floored to 0: anti-correlated features carry no
/// matching evidence. Fails on length mismatch, non-finite values, or a
/// (near) zero-norm vector.
pub fn similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(NeuroLockError::DimensionMismatch {
            expected: b.len(),
            actual: a.len(),
        });
    }
    if a.is_empty() {
        return Err(NeuroLockError::InvalidInput(
            "cannot compare empty feature vectors".to_string(),
        ));
    }
    if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
        return Err(NeuroLockError::InvalidInput(
            "feature vector contains non-finite values".to_string(),
        ));
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let (norm_a, norm_b) = (norm_a.sqrt(), norm_b.sqrt());
    if norm_a < NORM_EPSILON || norm_b < NORM_EPSILON {
        return Err(NeuroLockError::DegenerateVector {
            epsilon: NORM_EPSILON,
        });
    }

    let cosine = dot / (norm_a * norm_b);
    Ok(cosine.clamp(0.0, 1.0) as f32)
}
