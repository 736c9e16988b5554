//! Factor modules for site scoring
//!
//! A factor pairs a [`FactorSource`] (raw value at a point) with a
//! [`ScoringCurve`] (raw value to 1-10 score) and a weight. Sources are
//! queried concurrently from the worker pool, so they must be `Send + Sync`
//! and read-only.

pub mod proximity;
pub mod raster;

pub use proximity::{FeatureSet, ProximityFactor};
pub use raster::{RasterFactor, RasterGrid};

use std::fmt;
use std::sync::Arc;

use crate::error::ScoringResult;
use crate::grid::GridPoint;
use crate::utils::normalization::ScoringCurve;

/// Query one geographic factor's raw value at a point
///
/// `evaluate` must return `ScoringError::DataUnavailable` instead of a default
/// when the backing dataset cannot answer for the point.
pub trait FactorSource: Send + Sync {
    /// Dataset identifier used in logs and errors
    fn source_id(&self) -> &str;

    /// Raw value at `point` (metres for proximity, dataset units for rasters)
    fn evaluate(&self, point: &GridPoint) -> ScoringResult<f64>;

    /// (lowest, highest) value the dataset can produce, when known
    fn observed_range(&self) -> Option<(f64, f64)> {
        None
    }
}

/// A weighted factor ready for scoring
#[derive(Clone)]
pub struct Factor {
    pub id: String,
    pub weight: f64,
    pub source: Arc<dyn FactorSource>,
    pub curve: ScoringCurve,
}

impl Factor {
    pub fn new(
        id: impl Into<String>,
        weight: f64,
        source: Arc<dyn FactorSource>,
        curve: ScoringCurve,
    ) -> Self {
        Self {
            id: id.into(),
            weight,
            source,
            curve,
        }
    }

    /// Raw value and its curve score at a point
    pub fn score_at(&self, point: &GridPoint) -> ScoringResult<FactorReading> {
        let raw = self.source.evaluate(point)?;
        Ok(FactorReading {
            raw,
            score: self.curve.score(raw),
        })
    }
}

impl fmt::Debug for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factor")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("source", &self.source.source_id())
            .field("curve", &self.curve)
            .finish()
    }
}

/// Raw value and score of one factor at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorReading {
    pub raw: f64,
    pub score: f64,
}
