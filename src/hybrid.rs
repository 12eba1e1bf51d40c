//! Hybrid scoring: one ranking value from independent semantic and keyword scores.
//!
//! Both inputs are optional. An item without an embedding has no semantic
//! score and still ranks on its keyword score alone; the missing signal is
//! not renormalized against.
//!
//! | semantic | keyword | final |
//! |----------|---------|-------|
//! | `None` | `None` | `0.0` |
//! | `Some(s)` | `None` | `s` |
//! | `None` | `Some(k)` | `k` |
//! | `Some(s)` | `Some(k)` | `w_s × s + w_k × k` |
//!
//! Present scores must be finite and within `[0, 1]`; anything else is
//! rejected rather than clamped.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tolerance applied when checking that weights sum to `1.0`.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Relative weights for the two signals. Must sum to `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub semantic: f64,
    pub keyword: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            keyword: 0.3,
        }
    }
}

/// Result of [`hybrid_score`]. Computed on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HybridScore {
    pub semantic: Option<f64>,
    pub keyword: Option<f64>,
    pub weights: HybridWeights,
    pub final_score: f64,
}

pub fn validate_weights(weights: &HybridWeights) -> Result<(), ValidationError> {
    for (name, w) in [("semantic", weights.semantic), ("keyword", weights.keyword)] {
        if !w.is_finite() || w < 0.0 {
            return Err(ValidationError::InvalidWeights(format!(
                "{} weight must be non-negative, got {}",
                name, w
            )));
        }
        if w > 1.0 {
            return Err(ValidationError::InvalidWeights(format!(
                "{} weight must be <= 1.0, got {}",
                name, w
            )));
        }
    }

    let sum = weights.semantic + weights.keyword;
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ValidationError::InvalidWeights(format!(
            "weights must sum to 1.0, got {}",
            sum
        )));
    }

    Ok(())
}

fn validate_score(name: &str, score: Option<f64>) -> Result<(), ValidationError> {
    match score {
        Some(s) if !(0.0..=1.0).contains(&s) => Err(ValidationError::InvalidScore(format!(
            "{} score must be within [0, 1], got {}",
            name, s
        ))),
        _ => Ok(()),
    }
}

/// Combine a semantic and a keyword score into a single ranking value.
pub fn hybrid_score(
    semantic: Option<f64>,
    keyword: Option<f64>,
    weights: HybridWeights,
) -> Result<HybridScore, ValidationError> {
    validate_weights(&weights)?;
    validate_score("semantic", semantic)?;
    validate_score("keyword", keyword)?;

    let final_score = match (semantic, keyword) {
        (None, None) => 0.0,
        (Some(s), None) => s,
        (None, Some(k)) => k,
        (Some(s), Some(k)) => weights.semantic * s + weights.keyword * k,
    };

    Ok(HybridScore {
        semantic,
        keyword,
        weights,
        final_score,
    })
}
