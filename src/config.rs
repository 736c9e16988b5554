//! Run Configuration
//!
//! One JSON document describes a run: the region, the weighted factors with
//! their curves, the exclusion masks, and the datasets they read. Everything
//! is validated here, before any dataset is opened or any point is scored.
//!
//! ```json
//! {
//!   "region": { "latMin": -28.0, "latMax": -16.0, "lonMin": 138.0, "lonMax": 154.0, "spacingDegrees": 0.1 },
//!   "factors": [
//!     { "id": "substation", "weight": 0.35, "datasetRef": "substations",
//!       "curve": { "type": "reference", "name": "substation" } },
//!     { "id": "temperature", "weight": 0.25, "datasetRef": "mean_temperature",
//!       "curve": { "type": "observedRange", "best": "lowest" } }
//!   ],
//!   "exclusionMasks": [ { "id": "flood", "datasetRef": "flood_overlay" } ],
//!   "datasets": {
//!     "substations": { "kind": "points", "path": "substations.csv" },
//!     "mean_temperature": { "kind": "raster", "path": "temperature.csv" },
//!     "flood_overlay": { "kind": "hazard", "path": "flood.geojson" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregator;
use crate::error::{ScoringError, ScoringResult};
use crate::grid::{BoundingRegion, Grid};
use crate::presentation::PresentationConfig;
use crate::utils::normalization::{reference_curves, Breakpoint, ScoringCurve};

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuitabilityConfig {
    pub region: BoundingRegion,
    pub factors: Vec<FactorDefinition>,
    #[serde(default)]
    pub exclusion_masks: Vec<ExclusionMaskDefinition>,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetDefinition>,
    #[serde(default)]
    pub engine: EngineOptions,
    #[serde(default)]
    pub presentation: PresentationConfig,

    /// Directory relative dataset paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One weighted factor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorDefinition {
    pub id: String,
    pub weight: f64,
    pub dataset_ref: String,
    pub curve: CurveConfig,
}

/// One hazard mask
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionMaskDefinition {
    pub id: String,
    pub dataset_ref: String,
}

/// How a factor's raw value maps to a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CurveConfig {
    /// Explicit ascending breakpoints
    Piecewise { breakpoints: Vec<Breakpoint> },
    /// One of the documented reference curves
    Reference { name: ReferenceCurve },
    /// Linear over the dataset's observed value range
    ObservedRange { best: RangeEnd },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceCurve {
    Substation,
    TransmissionLine,
    MajorRoad,
}

impl ReferenceCurve {
    pub fn curve(self) -> ScoringCurve {
        match self {
            ReferenceCurve::Substation => reference_curves::substation(),
            ReferenceCurve::TransmissionLine => reference_curves::transmission_line(),
            ReferenceCurve::MajorRoad => reference_curves::major_road(),
        }
    }
}

/// Which end of an observed range scores 10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeEnd {
    Lowest,
    Highest,
}

impl CurveConfig {
    /// Build the curve; observed-range curves need the dataset's value range
    pub fn resolve(&self, observed: Option<(f64, f64)>) -> ScoringResult<ScoringCurve> {
        match self {
            CurveConfig::Piecewise { breakpoints } => {
                ScoringCurve::new(breakpoints.iter().copied())
            }
            CurveConfig::Reference { name } => Ok(name.curve()),
            CurveConfig::ObservedRange { best } => {
                let (lowest, highest) = observed.ok_or_else(|| {
                    ScoringError::curve(
                        "observed-range curve needs a dataset with a known value range",
                    )
                })?;
                match best {
                    RangeEnd::Lowest => ScoringCurve::inverted_range(lowest, highest),
                    RangeEnd::Highest => ScoringCurve::ascending_range(lowest, highest),
                }
            }
        }
    }
}

/// Dataset file and what it contains
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDefinition {
    pub kind: DatasetKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// `lat`, `lon` columns
    Points,
    /// `line_id`, `lat`, `lon` columns, vertices in row order
    Lines,
    /// `lat`, `lon`, `value` cell centres
    Raster,
    /// GeoJSON polygons
    Hazard,
}

impl DatasetKind {
    fn serves_factors(self) -> bool {
        !matches!(self, DatasetKind::Hazard)
    }
}

/// What to do with a point when a factor cannot be evaluated there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Drop the missing factor and renormalise the remaining weights
    #[default]
    Renormalize,
    /// Leave the point out of the output
    Omit,
}

/// Worker pool and batching
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    /// Worker threads; 0 uses the available parallelism
    pub threads: usize,
    /// Points per batch; cancellation is checked between batches
    pub batch_size: usize,
    pub degraded_policy: DegradedPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: 1024,
            degraded_policy: DegradedPolicy::Renormalize,
        }
    }
}

impl SuitabilityConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;

        let mut config = Self::from_json(&contents)
            .with_context(|| format!("Invalid configuration: {:?}", path))?;

        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: SuitabilityConfig = serde_json::from_str(contents)
            .with_context(|| "Failed to parse configuration JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Check every startup invariant
    ///
    /// Region bounds, weight sum, explicit curves, unique ids, dataset
    /// references and their kinds.
    pub fn validate(&self) -> ScoringResult<()> {
        Grid::new(self.region)?;

        Aggregator::new(self.factors.iter().map(|f| f.weight).collect()).map_err(|e| match e {
            ScoringError::InvalidWeights(msg) => {
                let ids: Vec<&str> = self.factors.iter().map(|f| f.id.as_str()).collect();
                ScoringError::InvalidWeights(format!("{} (factors: {:?})", msg, ids))
            }
            other => other,
        })?;

        let mut seen = HashSet::new();
        for factor in &self.factors {
            if !seen.insert(factor.id.as_str()) {
                return Err(ScoringError::InvalidConfig(format!(
                    "duplicate factor id '{}'",
                    factor.id
                )));
            }

            let dataset = self.dataset(&factor.dataset_ref)?;
            if !dataset.kind.serves_factors() {
                return Err(ScoringError::InvalidConfig(format!(
                    "factor '{}' references hazard dataset '{}'",
                    factor.id, factor.dataset_ref
                )));
            }

            match &factor.curve {
                CurveConfig::Piecewise { breakpoints } => {
                    ScoringCurve::new(breakpoints.iter().copied())
                        .map_err(|e| e.for_factor(&factor.id))?;
                }
                CurveConfig::ObservedRange { .. } if dataset.kind != DatasetKind::Raster => {
                    return Err(ScoringError::curve(format!(
                        "observed-range curve requires a raster dataset, '{}' is {:?}",
                        factor.dataset_ref, dataset.kind
                    ))
                    .for_factor(&factor.id));
                }
                _ => {}
            }
        }

        let mut seen_masks = HashSet::new();
        for mask in &self.exclusion_masks {
            if !seen_masks.insert(mask.id.as_str()) {
                return Err(ScoringError::InvalidConfig(format!(
                    "duplicate exclusion mask id '{}'",
                    mask.id
                )));
            }
            let dataset = self.dataset(&mask.dataset_ref)?;
            if dataset.kind != DatasetKind::Hazard {
                return Err(ScoringError::InvalidConfig(format!(
                    "exclusion mask '{}' needs a hazard dataset, '{}' is {:?}",
                    mask.id, mask.dataset_ref, dataset.kind
                )));
            }
        }

        if self.engine.batch_size == 0 {
            return Err(ScoringError::InvalidConfig(
                "engine.batchSize must be positive".to_string(),
            ));
        }

        Ok(())
    }

    fn dataset(&self, name: &str) -> ScoringResult<&DatasetDefinition> {
        self.datasets
            .get(name)
            .ok_or_else(|| ScoringError::InvalidConfig(format!("unknown dataset '{}'", name)))
    }

    /// Absolute (or base-relative) path of a dataset file
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn factor_ids(&self) -> Vec<String> {
        self.factors.iter().map(|f| f.id.clone()).collect()
    }
}
