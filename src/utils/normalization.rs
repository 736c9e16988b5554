//! Normalization Utilities
//!
//! Converts raw factor values (distances in metres, raster values) into
//! suitability scores on the 1-10 scale using piecewise-linear curves.
//!
//! Curves are plain data: any non-decreasing breakpoint sequence is accepted,
//! so a factor's shape is extended by adding breakpoints in configuration
//! rather than by changing code.

use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

/// Lowest score a curve may assign
pub const MIN_FACTOR_SCORE: f64 = 1.0;

/// Highest score a curve may assign
pub const MAX_FACTOR_SCORE: f64 = 10.0;

/// One (distance-or-value, score) pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub at: f64,
    pub score: f64,
}

impl Breakpoint {
    pub const fn new(at: f64, score: f64) -> Self {
        Self { at, score }
    }
}

impl From<(f64, f64)> for Breakpoint {
    fn from((at, score): (f64, f64)) -> Self {
        Breakpoint::new(at, score)
    }
}

/// Validated piecewise-linear scoring curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringCurve {
    breakpoints: Vec<Breakpoint>,
}

impl ScoringCurve {
    /// Build a curve, rejecting empty, unsorted, non-finite or out-of-band input
    ///
    /// Equal consecutive positions are allowed and form a step.
    pub fn new<B: Into<Breakpoint>>(
        breakpoints: impl IntoIterator<Item = B>,
    ) -> ScoringResult<Self> {
        let breakpoints: Vec<Breakpoint> = breakpoints.into_iter().map(Into::into).collect();

        if breakpoints.is_empty() {
            return Err(ScoringError::curve("at least one breakpoint is required"));
        }

        for (i, bp) in breakpoints.iter().enumerate() {
            if !bp.at.is_finite() || !bp.score.is_finite() {
                return Err(ScoringError::curve(format!("breakpoint {} is not finite", i)));
            }
            if bp.score < MIN_FACTOR_SCORE || bp.score > MAX_FACTOR_SCORE {
                return Err(ScoringError::curve(format!(
                    "breakpoint {} score {} outside [{}, {}]",
                    i, bp.score, MIN_FACTOR_SCORE, MAX_FACTOR_SCORE
                )));
            }
        }

        if let Some(i) = breakpoints.windows(2).position(|w| w[1].at < w[0].at) {
            return Err(ScoringError::curve(format!(
                "breakpoints not ascending at index {} ({} after {})",
                i + 1,
                breakpoints[i + 1].at,
                breakpoints[i].at
            )));
        }

        Ok(Self { breakpoints })
    }

    /// Linear curve from `lowest` (score 10) to `highest` (score 1)
    ///
    /// Used for "cooler is better" climate factors. A degenerate range gives a
    /// constant ideal score.
    pub fn inverted_range(lowest: f64, highest: f64) -> ScoringResult<Self> {
        if lowest >= highest {
            return Self::new([(lowest, MAX_FACTOR_SCORE)]);
        }
        Self::new([(lowest, MAX_FACTOR_SCORE), (highest, MIN_FACTOR_SCORE)])
    }

    /// Linear curve from `lowest` (score 1) to `highest` (score 10)
    pub fn ascending_range(lowest: f64, highest: f64) -> ScoringResult<Self> {
        if lowest >= highest {
            return Self::new([(lowest, MAX_FACTOR_SCORE)]);
        }
        Self::new([(lowest, MIN_FACTOR_SCORE), (highest, MAX_FACTOR_SCORE)])
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Score a raw value
    ///
    /// Algorithm:
    /// 1. Below the first breakpoint: first score (clamped, not extrapolated)
    /// 2. At or above the last breakpoint: last score
    /// 3. Otherwise take the last breakpoint `i` with `at <= raw` and interpolate
    ///    towards `i + 1`: `s1 + (s2 - s1) * (raw - d1) / (d2 - d1)`
    ///
    /// Step 3 makes steps right-continuous: a value exactly on a step position
    /// scores with the last breakpoint at that position.
    pub fn score(&self, raw_value: f64) -> f64 {
        let bps = &self.breakpoints;
        let first = bps[0];
        let last = bps[bps.len() - 1];

        if raw_value < first.at {
            return first.score;
        }
        if raw_value >= last.at {
            return last.score;
        }

        // first.at <= raw < last.at, so partition point is in 1..len
        let upper = bps.partition_point(|bp| bp.at <= raw_value);
        let lo = bps[upper - 1];
        let hi = bps[upper];

        let span = hi.at - lo.at;
        if span <= 0.0 {
            return hi.score;
        }
        lo.score + (hi.score - lo.score) * (raw_value - lo.at) / span
    }
}

/// Documented reference curves for the standard data-centre factors
///
/// Positions are metres for proximity factors. Values beyond the last cited
/// breakpoint are clamped; further decay belongs in configuration as explicit
/// breakpoints.
pub mod reference_curves {
    use super::{Breakpoint, ScoringCurve};

    /// Setback inside 100 m, ideal from 100 m out to 1 km
    pub fn substation() -> ScoringCurve {
        ScoringCurve {
            breakpoints: vec![
                Breakpoint::new(0.0, 1.0),
                Breakpoint::new(100.0, 1.0),
                Breakpoint::new(100.0, 10.0),
                Breakpoint::new(1000.0, 10.0),
            ],
        }
    }

    /// 10 at 1 km falling linearly to 2 at 40 km
    pub fn transmission_line() -> ScoringCurve {
        ScoringCurve {
            breakpoints: vec![Breakpoint::new(1000.0, 10.0), Breakpoint::new(40_000.0, 2.0)],
        }
    }

    /// Ideal within 500 m
    pub fn major_road() -> ScoringCurve {
        ScoringCurve {
            breakpoints: vec![Breakpoint::new(0.0, 10.0), Breakpoint::new(500.0, 10.0)],
        }
    }
}
