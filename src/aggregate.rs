//! Aggregator - weighted combination of factor scores
//!
//! Weights are validated once when the aggregator is built; a configuration
//! whose weights do not sum to 1.0 is rejected, never normalised. Exclusion
//! is a binary multiplier and always wins.

use crate::error::{ScoringError, ScoringResult};

/// Allowed deviation of the weight sum from 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Upper bound of the final suitability score
pub const MAX_FINAL_SCORE: f64 = 10.0;

/// Result of aggregating one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Final score in [0, 10]; `None` when no factor with weight was available
    pub score: Option<f64>,
    /// At least one factor was missing for this point
    pub degraded: bool,
}

/// Validated factor weights, in factor order
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregator {
    weights: Vec<f64>,
}

impl Aggregator {
    /// Validate weights: each finite in [0, 1], at least one, sum 1.0 +/- 1e-9
    pub fn new(weights: Vec<f64>) -> ScoringResult<Self> {
        if weights.is_empty() {
            return Err(ScoringError::InvalidWeights(
                "at least one factor is required".to_string(),
            ));
        }

        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0 || **w > 1.0)
        {
            return Err(ScoringError::InvalidWeights(format!(
                "weight {} at position {} is outside [0, 1]",
                w, i
            )));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ScoringError::InvalidWeights(format!(
                "weights sum to {} (expected 1.0 +/- {})",
                sum, WEIGHT_SUM_TOLERANCE
            )));
        }

        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Combine per-factor scores into a final score
    ///
    /// `scores[i]` is `None` when factor `i` was unavailable at this point.
    ///
    /// - excluded: 0, regardless of the factor scores
    /// - all present: `sum(score * weight)`
    /// - some missing: degraded; remaining weights renormalised for this point
    /// - nothing with weight left: degraded with no score
    pub fn final_score(&self, scores: &[Option<f64>], excluded: bool) -> Aggregate {
        debug_assert_eq!(scores.len(), self.weights.len());

        let degraded = scores.iter().any(Option::is_none);

        if excluded {
            return Aggregate { score: Some(0.0), degraded };
        }

        let (weighted, available_weight) = scores
            .iter()
            .zip(&self.weights)
            .filter_map(|(s, w)| s.map(|s| (s * w, *w)))
            .fold((0.0, 0.0), |(acc, wsum), (sw, w)| (acc + sw, wsum + w));

        let score = if !degraded {
            Some(weighted)
        } else if available_weight > 0.0 {
            Some(weighted / available_weight)
        } else {
            None
        };

        Aggregate {
            score: score.map(|s| s.clamp(0.0, MAX_FINAL_SCORE)),
            degraded,
        }
    }
}
