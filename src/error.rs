//! Error types for suitability scoring
//!
//! Configuration problems (region, weights, curves, dataset wiring) are fatal
//! and surface before any point is scored. `DataUnavailable` is the only
//! per-point condition; the engine degrades that point and keeps going.

use thiserror::Error;

/// Domain errors raised by the scoring pipeline
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    /// Bounding region is empty, inverted, or has a non-positive spacing
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// Factor weights are out of range or do not sum to 1.0
    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    /// Scoring curve breakpoints are empty, unsorted, or out of the score band
    #[error("invalid curve for factor '{factor}': {reason}")]
    InvalidCurve { factor: String, reason: String },

    /// Configuration references are inconsistent (duplicate ids, unknown datasets)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backing dataset cannot answer for a specific point
    #[error("data unavailable from '{source_id}' at ({lat:.5}, {lon:.5}): {reason}")]
    DataUnavailable {
        source_id: String,
        lat: f64,
        lon: f64,
        reason: String,
    },

    /// The run was cancelled between batches
    #[error("scoring run cancelled")]
    Cancelled,
}

impl ScoringError {
    /// Curve error without a factor id (filled in by the caller that knows it)
    pub fn curve(reason: impl Into<String>) -> Self {
        ScoringError::InvalidCurve {
            factor: String::new(),
            reason: reason.into(),
        }
    }

    /// Attach the owning factor id to an `InvalidCurve` error
    pub fn for_factor(self, factor_id: &str) -> Self {
        match self {
            ScoringError::InvalidCurve { reason, .. } => ScoringError::InvalidCurve {
                factor: factor_id.to_string(),
                reason,
            },
            other => other,
        }
    }
}

pub type ScoringResult<T> = std::result::Result<T, ScoringError>;
