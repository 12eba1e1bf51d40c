//! Vector math over fixed-dimension embedding vectors.
//!
//! Every binary operation is dimension-checked and fails with
//! [`ValidationError::DimensionMismatch`] instead of silently truncating.
//! Accumulation happens in `f64` so 1536-wide sums stay accurate.
//!
//! [`cosine_similarity`] is remapped from the natural `[-1, 1]` range to
//! `[0, 1]` so it can be combined directly with keyword scores by the
//! [hybrid scorer](crate::hybrid).

use crate::error::ValidationError;

/// Dimension produced by the default embedding model.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Fail unless `v` has exactly `expected` components.
pub fn validate_dimensions(v: &[f32], expected: usize) -> Result<(), ValidationError> {
    if v.len() != expected {
        return Err(ValidationError::DimensionMismatch {
            expected,
            got: v.len(),
        });
    }
    Ok(())
}

fn check_same_len(a: &[f32], b: &[f32]) -> Result<(), ValidationError> {
    validate_dimensions(b, a.len())
}

/// Euclidean length of `v`.
pub fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f64, ValidationError> {
    check_same_len(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum())
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f64, ValidationError> {
    check_same_len(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt())
}

/// Cosine similarity remapped to `[0.0, 1.0]`.
///
/// ```text
///                 a · b
/// raw = ─────────────────────      score = clamp((raw + 1) / 2, 0, 1)
///          ‖a‖ × ‖b‖
/// ```
///
/// - `1.0` = identical direction
/// - `0.5` = orthogonal
/// - `0.0` = opposite direction
///
/// Returns `0.0` if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, ValidationError> {
    check_same_len(a, b)?;

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return Ok(0.0);
    }

    let raw = dot / denom;
    Ok(((raw + 1.0) / 2.0).clamp(0.0, 1.0))
}

/// Scale `v` to unit length.
pub fn normalize_vector(v: &[f32]) -> Result<Vec<f32>, ValidationError> {
    let mag = magnitude(v);
    if mag < f64::EPSILON {
        return Err(ValidationError::ZeroVector);
    }
    Ok(v.iter().map(|x| ((*x as f64) / mag) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v).unwrap();
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_maps_to_half() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_opposite_maps_to_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.3, -1.2, 4.0, 0.01];
        let b = vec![2.5, 0.7, -0.4, 9.0];
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_normalize_unit_magnitude() {
        let v: Vec<f32> = (0..DEFAULT_DIMENSIONS).map(|i| (i % 7) as f32 - 3.0).collect();
        let n = normalize_vector(&v).unwrap();
        assert!((magnitude(&n) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_zero_fails() {
        assert_eq!(
            normalize_vector(&[0.0, 0.0, 0.0]).unwrap_err(),
            ValidationError::ZeroVector
        );
    }

    #[test]
    fn test_dot_and_distance() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b).unwrap() - 32.0).abs() < 1e-9);
        assert!((euclidean_distance(&a, &b).unwrap() - 27.0f64.sqrt()).abs() < 1e-9);
        assert!(dot_product(&a, &[1.0]).is_err());
        assert!(euclidean_distance(&a, &[1.0]).is_err());
    }

    #[test]
    fn test_validate_dimensions() {
        assert!(validate_dimensions(&vec![0.0; DEFAULT_DIMENSIONS], DEFAULT_DIMENSIONS).is_ok());
        assert!(validate_dimensions(&vec![0.0; 384], DEFAULT_DIMENSIONS).is_err());
    }
}
