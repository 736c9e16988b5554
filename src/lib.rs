//! Site Suitability Scorer
//!
//! Weighted multi-criteria scoring of a regular lat/lon grid. Each grid point
//! gets a 0-10 suitability score from proximity and raster factors, with
//! hazard polygons acting as hard exclusions. Output feeds a heatmap layer.
//!
//! Module layout:
//! - `grid`: region validation and grid generation
//! - `factors/`: factor sources (proximity, raster) and the weighted `Factor`
//! - `utils/`: scoring curves and Polars loading helpers
//! - `exclusion`: hazard masks
//! - `aggregate`: weight validation and final score
//! - `scorer`: the parallel scoring engine
//! - `config`, `data`: JSON configuration and dataset loading
//! - `output`, `presentation`: writers and the map payload

pub mod error;
pub mod grid;
pub mod geo;
pub mod utils;
pub mod factors;
pub mod exclusion;
pub mod aggregate;
pub mod config;
pub mod data;
pub mod output;
pub mod presentation;
pub mod scorer;

#[cfg(feature = "api")]
pub mod api_server;

// Re-export commonly used types
pub use error::{ScoringError, ScoringResult};
pub use grid::{BoundingRegion, Grid, GridPoint};
pub use utils::{reference_curves, Breakpoint, ScoringCurve};
pub use factors::{Factor, FactorSource, FeatureSet, ProximityFactor, RasterFactor, RasterGrid};
pub use exclusion::{is_excluded, ExclusionMask, HazardBoundary, Polygon};
pub use aggregate::{Aggregate, Aggregator};
pub use config::{DegradedPolicy, EngineOptions, SuitabilityConfig};
pub use data::{Dataset, DatasetCatalog};
pub use output::{heatmap_triples, write_run, HeatmapPoint, RunSummary, ScoredPoint, ScoringRun};
pub use presentation::{rank_sites, CandidateSite, MapPresentation, PresentationConfig};
pub use scorer::{CancellationToken, ScoringEngine};

#[cfg(feature = "api")]
pub use api_server::{create_router, AppState};
