//! Grid Generator - regular lattice of candidate sites over a region
//!
//! Points are emitted row-major: ascending latitude, then ascending longitude.
//! The grid is a pure function of the region, so identical inputs always give
//! the identical sequence.
//!
//! ## Inclusion rule
//! `count = floor((max - min) / spacing + GRID_EPSILON) + 1` per axis, and the
//! i-th coordinate is `min + i * spacing` clamped to `max`. The epsilon snaps
//! quotients like `2.9999999999999996` to `3` so a boundary that is an exact
//! multiple of the spacing is always included.

use serde::{Deserialize, Serialize};

use crate::error::{ScoringError, ScoringResult};

/// Tolerance applied to the per-axis step quotient
pub const GRID_EPSILON: f64 = 1e-9;

/// Largest grid a region may generate
pub const MAX_GRID_POINTS: usize = 100_000_000;

/// Area to sample, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRegion {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub spacing_degrees: f64,
}

impl BoundingRegion {
    pub fn new(
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
        spacing_degrees: f64,
    ) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            spacing_degrees,
        }
    }

    /// Check bounds ordering and spacing
    pub fn validate(&self) -> ScoringResult<()> {
        let values = [self.lat_min, self.lat_max, self.lon_min, self.lon_max, self.spacing_degrees];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::InvalidRegion(format!(
                "all bounds must be finite: {:?}",
                self
            )));
        }
        if self.lat_min >= self.lat_max {
            return Err(ScoringError::InvalidRegion(format!(
                "latMin {} must be below latMax {}",
                self.lat_min, self.lat_max
            )));
        }
        if self.lon_min >= self.lon_max {
            return Err(ScoringError::InvalidRegion(format!(
                "lonMin {} must be below lonMax {}",
                self.lon_min, self.lon_max
            )));
        }
        if self.spacing_degrees <= 0.0 {
            return Err(ScoringError::InvalidRegion(format!(
                "spacingDegrees must be positive, got {}",
                self.spacing_degrees
            )));
        }
        Ok(())
    }
}

/// One sampled coordinate. Never mutated after generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GridPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Validated grid over a region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    region: BoundingRegion,
    rows: usize,
    cols: usize,
}

impl Grid {
    /// Validate the region and compute the lattice dimensions
    ///
    /// Regions generating more than [`MAX_GRID_POINTS`] points are rejected.
    pub fn new(region: BoundingRegion) -> ScoringResult<Self> {
        region.validate()?;

        let rows = axis_count(region.lat_min, region.lat_max, region.spacing_degrees);
        let cols = axis_count(region.lon_min, region.lon_max, region.spacing_degrees);

        let (rows, cols) = match (rows, cols) {
            (Some(r), Some(c)) if r.checked_mul(c).is_some_and(|n| n <= MAX_GRID_POINTS) => (r, c),
            _ => {
                return Err(ScoringError::InvalidRegion(format!(
                    "spacing {} gives more than {} grid points",
                    region.spacing_degrees, MAX_GRID_POINTS
                )))
            }
        };

        Ok(Self { region, rows, cols })
    }

    pub fn region(&self) -> &BoundingRegion {
        &self.region
    }

    /// (rows, cols) = (latitude count, longitude count)
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat row-major index of a (row, col) cell
    pub fn index_of(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    /// Point at a flat row-major index
    pub fn point_at(&self, index: usize) -> Option<GridPoint> {
        if index >= self.len() {
            return None;
        }
        let row = index / self.cols;
        let col = index % self.cols;
        Some(GridPoint::new(
            axis_value(self.region.lat_min, self.region.lat_max, self.region.spacing_degrees, row),
            axis_value(self.region.lon_min, self.region.lon_max, self.region.spacing_degrees, col),
        ))
    }

    /// Fresh iterator over all points; call again to restart
    pub fn points(&self) -> GridIter {
        GridIter { grid: *self, next: 0 }
    }
}

impl IntoIterator for &Grid {
    type Item = GridPoint;
    type IntoIter = GridIter;

    fn into_iter(self) -> GridIter {
        self.points()
    }
}

/// Row-major iterator over a [`Grid`]
#[derive(Debug, Clone)]
pub struct GridIter {
    grid: Grid,
    next: usize,
}

impl Iterator for GridIter {
    type Item = GridPoint;

    fn next(&mut self) -> Option<GridPoint> {
        let point = self.grid.point_at(self.next)?;
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridIter {}

/// Points along one axis, `None` when the count is not representable
fn axis_count(min: f64, max: f64, spacing: f64) -> Option<usize> {
    let steps = ((max - min) / spacing + GRID_EPSILON).floor();
    if !steps.is_finite() || steps >= MAX_GRID_POINTS as f64 {
        return None;
    }
    (steps as usize).checked_add(1)
}

fn axis_value(min: f64, max: f64, spacing: f64, i: usize) -> f64 {
    (min + i as f64 * spacing).min(max)
}
