//! Raster Factor - value sampled from a gridded dataset
//!
//! Backs climate factors such as mean annual temperature. The raster is a
//! regular lat/lon lattice of cell centres; sampling picks the nearest cell.
//! Points beyond half a cell outside the lattice, and no-data cells, are
//! reported as unavailable rather than guessed.

use std::sync::Arc;

use crate::error::{ScoringError, ScoringResult};
use crate::factors::FactorSource;
use crate::grid::GridPoint;

/// Relative tolerance (in cells) for snapping scattered cell centres to the lattice
const CELL_ALIGNMENT_TOLERANCE: f64 = 1e-6;

/// Coordinates closer than this fraction of the axis span are the same centre
const COORDINATE_MERGE_TOLERANCE: f64 = 1e-9;

/// Largest lattice `from_cells` will allocate
pub const MAX_RASTER_CELLS: usize = 50_000_000;

/// Regular grid of cell-centre values, row-major by ascending latitude
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    lat_origin: f64,
    lon_origin: f64,
    lat_step: f64,
    lon_step: f64,
    rows: usize,
    cols: usize,
    /// NaN marks no-data
    values: Vec<f64>,
    observed: Option<(f64, f64)>,
}

impl RasterGrid {
    /// Build from an explicit lattice definition
    ///
    /// # Arguments
    /// * `lat_origin`, `lon_origin` - centre of the south-west cell
    /// * `lat_step`, `lon_step` - positive cell sizes in degrees
    /// * `values` - `rows * cols` values, row-major, NaN for no-data
    pub fn new(
        lat_origin: f64,
        lon_origin: f64,
        lat_step: f64,
        lon_step: f64,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    ) -> ScoringResult<Self> {
        if !(lat_step > 0.0 && lon_step > 0.0) {
            return Err(ScoringError::InvalidConfig(format!(
                "raster cell size must be positive, got ({}, {})",
                lat_step, lon_step
            )));
        }
        if rows == 0 || cols == 0 || rows.checked_mul(cols) != Some(values.len()) {
            return Err(ScoringError::InvalidConfig(format!(
                "raster shape {}x{} does not match {} values",
                rows,
                cols,
                values.len()
            )));
        }

        let observed = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            });

        Ok(Self {
            lat_origin,
            lon_origin,
            lat_step,
            lon_step,
            rows,
            cols,
            values,
            observed,
        })
    }

    /// Build from scattered `(lat, lon, value)` cell centres
    ///
    /// The lattice is inferred from the distinct coordinates: the smallest gap
    /// between distinct latitudes (longitudes) is the cell size, and every
    /// centre must sit on that lattice. Coordinates that differ only by float
    /// noise count as one. Missing cells become no-data; a lattice larger than
    /// [`MAX_RASTER_CELLS`] is rejected.
    pub fn from_cells(cells: &[(f64, f64, Option<f64>)]) -> ScoringResult<Self> {
        if cells.is_empty() {
            return Err(ScoringError::InvalidConfig("raster has no cells".to_string()));
        }
        if let Some(c) = cells.iter().find(|c| !c.0.is_finite() || !c.1.is_finite()) {
            return Err(ScoringError::InvalidConfig(format!(
                "raster cell centre ({}, {}) is not finite",
                c.0, c.1
            )));
        }

        let lats = distinct_sorted(cells.iter().map(|c| c.0));
        let lons = distinct_sorted(cells.iter().map(|c| c.1));
        let lat_step = min_gap(&lats).unwrap_or(1.0);
        let lon_step = min_gap(&lons).unwrap_or(1.0);

        let lat_origin = lats[0];
        let lon_origin = lons[0];
        let rows = axis_len(lats[lats.len() - 1], lat_origin, lat_step)?;
        let cols = axis_len(lons[lons.len() - 1], lon_origin, lon_step)?;

        let total = rows
            .checked_mul(cols)
            .filter(|&n| n <= MAX_RASTER_CELLS)
            .ok_or_else(|| {
                ScoringError::InvalidConfig(format!(
                    "raster lattice {}x{} (cell {} x {} degrees) exceeds {} cells",
                    rows, cols, lat_step, lon_step, MAX_RASTER_CELLS
                ))
            })?;

        let mut values = vec![f64::NAN; total];
        for &(lat, lon, value) in cells {
            let row = lattice_index(lat, lat_origin, lat_step)?;
            let col = lattice_index(lon, lon_origin, lon_step)?;
            if let Some(v) = value {
                values[row * cols + col] = v;
            }
        }

        Self::new(lat_origin, lon_origin, lat_step, lon_step, rows, cols, values)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// (lowest, highest) finite value
    pub fn observed_range(&self) -> Option<(f64, f64)> {
        self.observed
    }

    /// Nearest-cell value, `Err(reason)` outside coverage or on no-data
    pub fn sample(&self, point: &GridPoint) -> Result<f64, &'static str> {
        let row = ((point.lat - self.lat_origin) / self.lat_step).round();
        let col = ((point.lon - self.lon_origin) / self.lon_step).round();

        if !row.is_finite() || !col.is_finite() {
            return Err("coordinate is not finite");
        }
        if row < 0.0 || col < 0.0 || row >= self.rows as f64 || col >= self.cols as f64 {
            return Err("outside raster coverage");
        }

        let value = self.values[row as usize * self.cols + col as usize];
        if value.is_finite() {
            Ok(value)
        } else {
            Err("no-data cell")
        }
    }
}

/// Sorted coordinates with near-duplicates merged into the first of each run
fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(|a, b| a.total_cmp(b));

    let span = match (v.first(), v.last()) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => return v,
    };
    let tolerance = COORDINATE_MERGE_TOLERANCE * span;
    v.dedup_by(|next, kept| *next - *kept <= tolerance);
    v
}

fn min_gap(sorted: &[f64]) -> Option<f64> {
    sorted.windows(2).map(|w| w[1] - w[0]).reduce(f64::min)
}

/// Number of lattice positions from `origin` up to and including `last`
fn axis_len(last: f64, origin: f64, step: f64) -> ScoringResult<usize> {
    lattice_index(last, origin, step)?
        .checked_add(1)
        .ok_or_else(|| {
            ScoringError::InvalidConfig(format!("raster axis step {} is too small", step))
        })
}

fn lattice_index(value: f64, origin: f64, step: f64) -> ScoringResult<usize> {
    let k = (value - origin) / step;
    let snapped = k.round();
    if !k.is_finite() || (k - snapped).abs() > CELL_ALIGNMENT_TOLERANCE * snapped.abs().max(1.0) {
        return Err(ScoringError::InvalidConfig(format!(
            "raster cell centre {} is not on a regular grid (origin {}, step {})",
            value, origin, step
        )));
    }
    Ok(snapped as usize)
}

/// Raster-value-at-point factor source
#[derive(Debug, Clone)]
pub struct RasterFactor {
    source_id: String,
    raster: Arc<RasterGrid>,
}

impl RasterFactor {
    pub fn new(source_id: impl Into<String>, raster: Arc<RasterGrid>) -> Self {
        Self {
            source_id: source_id.into(),
            raster,
        }
    }
}

impl FactorSource for RasterFactor {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn evaluate(&self, point: &GridPoint) -> ScoringResult<f64> {
        self.raster
            .sample(point)
            .map_err(|reason| ScoringError::DataUnavailable {
                source_id: self.source_id.clone(),
                lat: point.lat,
                lon: point.lon,
                reason: reason.to_string(),
            })
    }

    fn observed_range(&self) -> Option<(f64, f64)> {
        self.raster.observed_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature_raster() -> RasterGrid {
        // 2 rows x 3 cols of 1-degree cells, centres at lat -21/-20, lon 142..144
        RasterGrid::new(
            -21.0,
            142.0,
            1.0,
            1.0,
            2,
            3,
            vec![26.0, 25.5, 25.0, 24.0, f64::NAN, 23.0],
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_cell_sampling() {
        let raster = temperature_raster();
        assert_eq!(raster.sample(&GridPoint::new(-21.0, 142.0)), Ok(26.0));
        assert_eq!(raster.sample(&GridPoint::new(-20.2, 143.8)), Ok(23.0));
        // Half-cell padding around the outer centres
        assert_eq!(raster.sample(&GridPoint::new(-21.4, 141.6)), Ok(26.0));
    }

    #[test]
    fn test_outside_coverage_and_no_data() {
        let raster = temperature_raster();
        assert_eq!(raster.sample(&GridPoint::new(-22.0, 142.0)), Err("outside raster coverage"));
        assert_eq!(raster.sample(&GridPoint::new(-20.0, 145.0)), Err("outside raster coverage"));
        assert_eq!(raster.sample(&GridPoint::new(-20.0, 143.0)), Err("no-data cell"));

        let factor = RasterFactor::new("temperature", Arc::new(raster));
        let err = factor.evaluate(&GridPoint::new(-30.0, 142.0)).unwrap_err();
        assert!(matches!(err, ScoringError::DataUnavailable { .. }));
    }

    #[test]
    fn test_observed_range_skips_no_data() {
        let factor = RasterFactor::new("temperature", Arc::new(temperature_raster()));
        assert_eq!(factor.observed_range(), Some((23.0, 26.0)));
    }

    #[test]
    fn test_from_cells_infers_lattice() {
        let cells = vec![
            (-20.0, 142.5, Some(24.0)),
            (-21.0, 142.0, Some(26.0)),
            (-21.0, 142.5, None),
            (-20.0, 142.0, Some(25.0)),
            (-19.0, 143.0, Some(22.0)),
        ];
        let raster = RasterGrid::from_cells(&cells).unwrap();

        assert_eq!(raster.dimensions(), (3, 3));
        assert_eq!(raster.sample(&GridPoint::new(-20.0, 142.5)), Ok(24.0));
        assert_eq!(raster.sample(&GridPoint::new(-21.0, 142.5)), Err("no-data cell"));
        // Gap in the lattice is no-data
        assert_eq!(raster.sample(&GridPoint::new(-19.0, 142.0)), Err("no-data cell"));
        assert_eq!(raster.observed_range(), Some((22.0, 26.0)));
    }

    #[test]
    fn test_from_cells_rejects_irregular_grid() {
        let cells = vec![
            (-20.0, 142.0, Some(24.0)),
            (-20.0, 143.0, Some(24.0)),
            (-20.0, 144.5, Some(24.0)),
        ];
        assert!(matches!(
            RasterGrid::from_cells(&cells),
            Err(ScoringError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_cells_merges_float_noise() {
        // -26.500000000000004 is the same centre as -26.5
        let cells = vec![
            (-27.0, 152.0, Some(20.0)),
            (-26.5, 152.0, Some(21.0)),
            (-26.500000000000004, 152.5, Some(22.0)),
            (-27.0, 152.5, Some(23.0)),
        ];
        let raster = RasterGrid::from_cells(&cells).unwrap();

        assert_eq!(raster.dimensions(), (2, 2));
        assert_eq!(raster.sample(&GridPoint::new(-26.5, 152.5)), Ok(22.0));
        assert_eq!(raster.sample(&GridPoint::new(-27.0, 152.5)), Ok(23.0));
    }

    #[test]
    fn test_from_cells_rejects_oversized_lattice() {
        // 1e-7 degree rows over a 90 degree span
        let cells = vec![
            (0.0, 150.0, Some(1.0)),
            (1e-7, 150.0, Some(1.0)),
            (90.0, 150.0, Some(1.0)),
        ];
        assert!(matches!(
            RasterGrid::from_cells(&cells),
            Err(ScoringError::InvalidConfig(_))
        ));

        let non_finite = vec![(f64::NAN, 150.0, Some(1.0))];
        assert!(RasterGrid::from_cells(&non_finite).is_err());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(RasterGrid::new(0.0, 0.0, 1.0, 1.0, 2, 2, vec![1.0; 3]).is_err());
        assert!(RasterGrid::new(0.0, 0.0, 0.0, 1.0, 1, 1, vec![1.0]).is_err());
    }
}
