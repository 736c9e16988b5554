//! Data Loading and Management
//!
//! Loads the datasets named in a run configuration: point and polyline
//! features plus rasters through Polars (CSV or Parquet), hazard polygons
//! from GeoJSON through serde_json. Each dataset is loaded once and shared
//! read-only behind an `Arc`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::config::{DatasetKind, SuitabilityConfig};
use crate::exclusion::{HazardBoundary, Polygon};
use crate::factors::{FeatureSet, RasterGrid};
use crate::grid::GridPoint;
use crate::utils::lazy_helpers::{f64_values, materialize_with_columns, scan_table, string_values};

/// A loaded dataset, tagged with the kind it was declared as
#[derive(Debug, Clone)]
pub enum Dataset {
    Points(Arc<FeatureSet>),
    Lines(Arc<FeatureSet>),
    Raster(Arc<RasterGrid>),
    Hazard(Arc<HazardBoundary>),
}

impl Dataset {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::Points(_) => DatasetKind::Points,
            Dataset::Lines(_) => DatasetKind::Lines,
            Dataset::Raster(_) => DatasetKind::Raster,
            Dataset::Hazard(_) => DatasetKind::Hazard,
        }
    }
}

/// Every dataset a configuration references, keyed by dataset name
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    datasets: BTreeMap<String, Dataset>,
}

impl DatasetCatalog {
    /// Load all datasets referenced by factors and exclusion masks
    ///
    /// Datasets declared but never referenced are skipped.
    pub fn load(config: &SuitabilityConfig) -> Result<Self> {
        let referenced: Vec<&str> = config
            .factors
            .iter()
            .map(|f| f.dataset_ref.as_str())
            .chain(config.exclusion_masks.iter().map(|m| m.dataset_ref.as_str()))
            .collect();

        let mut catalog = DatasetCatalog::default();
        for name in referenced {
            if catalog.datasets.contains_key(name) {
                continue;
            }
            let definition = config
                .datasets
                .get(name)
                .ok_or_else(|| anyhow!("Unknown dataset '{}'", name))?;
            let path = config.resolve_path(&definition.path);

            let dataset = match definition.kind {
                DatasetKind::Points => Dataset::Points(Arc::new(load_points(&path)?)),
                DatasetKind::Lines => Dataset::Lines(Arc::new(load_lines(&path)?)),
                DatasetKind::Raster => Dataset::Raster(Arc::new(load_raster(&path)?)),
                DatasetKind::Hazard => Dataset::Hazard(Arc::new(load_hazard(name, &path)?)),
            };

            match &dataset {
                Dataset::Points(f) | Dataset::Lines(f) if f.is_empty() => {
                    tracing::warn!("Dataset {} has no features: {:?}", name, path)
                }
                Dataset::Points(f) | Dataset::Lines(f) => {
                    tracing::info!("Dataset {}: {} features from {:?}", name, f.len(), path)
                }
                Dataset::Raster(r) => {
                    let (rows, cols) = r.dimensions();
                    tracing::info!("Dataset {}: {}x{} raster from {:?}", name, rows, cols, path)
                }
                Dataset::Hazard(h) => {
                    let count = h.polygons().len();
                    tracing::info!("Dataset {}: {} hazard polygons from {:?}", name, count, path)
                }
            }

            catalog.datasets.insert(name.to_string(), dataset);
        }

        tracing::info!("Loaded {} datasets", catalog.datasets.len());
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }
}

// ============================================================================
// Tabular datasets (Polars)
// ============================================================================

/// Load point features from a table with `lat`, `lon` columns
///
/// Rows with a null coordinate are skipped.
pub fn load_points(path: &Path) -> Result<FeatureSet> {
    let context = format!("points {:?}", path);
    let df = materialize_with_columns(&scan_table(path)?, &["lat", "lon"], &context)?;

    let lats = f64_values(&df, "lat", &context)?;
    let lons = f64_values(&df, "lon", &context)?;

    let points = lats
        .into_iter()
        .zip(lons)
        .filter_map(|(lat, lon)| Some(GridPoint::new(lat?, lon?)))
        .collect();

    Ok(FeatureSet::from_points(points))
}

/// Load polylines from a table with `line_id`, `lat`, `lon` columns
///
/// Vertices keep their row order within each line; lines keep the order in
/// which their id first appears.
pub fn load_lines(path: &Path) -> Result<FeatureSet> {
    let context = format!("lines {:?}", path);
    let df = materialize_with_columns(&scan_table(path)?, &["line_id", "lat", "lon"], &context)?;

    let ids = string_values(&df, "line_id", &context)?;
    let lats = f64_values(&df, "lat", &context)?;
    let lons = f64_values(&df, "lon", &context)?;

    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut lines: Vec<Vec<GridPoint>> = Vec::new();

    for ((id, lat), lon) in ids.into_iter().zip(lats).zip(lons) {
        let (Some(id), Some(lat), Some(lon)) = (id, lat, lon) else {
            continue;
        };
        let slot = *index.entry(id).or_insert_with(|| {
            lines.push(Vec::new());
            lines.len() - 1
        });
        lines[slot].push(GridPoint::new(lat, lon));
    }

    Ok(FeatureSet::from_lines(lines))
}

/// Load a raster from a table of `lat`, `lon`, `value` cell centres
pub fn load_raster(path: &Path) -> Result<RasterGrid> {
    let context = format!("raster {:?}", path);
    let df = materialize_with_columns(&scan_table(path)?, &["lat", "lon", "value"], &context)?;

    let lats = f64_values(&df, "lat", &context)?;
    let lons = f64_values(&df, "lon", &context)?;
    let values = f64_values(&df, "value", &context)?;

    let cells: Vec<(f64, f64, Option<f64>)> = lats
        .into_iter()
        .zip(lons)
        .zip(values)
        .filter_map(|((lat, lon), value)| Some((lat?, lon?, value)))
        .collect();

    RasterGrid::from_cells(&cells).with_context(|| format!("{}: invalid raster layout", context))
}

// ============================================================================
// Hazard boundaries (GeoJSON)
// ============================================================================

/// Load hazard polygons from a GeoJSON file
pub fn load_hazard(id: &str, path: &Path) -> Result<HazardBoundary> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read hazard file: {:?}", path))?;
    let geojson: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))?;

    parse_hazard(id, &geojson).with_context(|| format!("Invalid hazard GeoJSON: {:?}", path))
}

/// Collect Polygon / MultiPolygon geometries from any GeoJSON object
pub fn parse_hazard(id: &str, geojson: &Value) -> Result<HazardBoundary> {
    let mut polygons = Vec::new();
    collect_polygons(geojson, &mut polygons)?;

    if polygons.is_empty() {
        bail!("no Polygon or MultiPolygon geometry found");
    }
    Ok(HazardBoundary::new(id, polygons))
}

fn collect_polygons(value: &Value, out: &mut Vec<Polygon>) -> Result<()> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("FeatureCollection without features"))?;
            for feature in features {
                collect_polygons(feature, out)?;
            }
        }
        "Feature" => {
            if let Some(geometry) = value.get("geometry").filter(|g| !g.is_null()) {
                collect_polygons(geometry, out)?;
            }
        }
        "GeometryCollection" => {
            let geometries = value
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("GeometryCollection without geometries"))?;
            for geometry in geometries {
                collect_polygons(geometry, out)?;
            }
        }
        "Polygon" => out.push(parse_polygon(coordinates(value)?)?),
        "MultiPolygon" => {
            let parts = coordinates(value)?
                .as_array()
                .ok_or_else(|| anyhow!("MultiPolygon coordinates must be an array"))?;
            for part in parts {
                out.push(parse_polygon(part)?);
            }
        }
        // Points and lines cannot contain a site
        _ => {}
    }
    Ok(())
}

fn coordinates(geometry: &Value) -> Result<&Value> {
    geometry
        .get("coordinates")
        .ok_or_else(|| anyhow!("geometry without coordinates"))
}

/// Rings are arrays of `[lon, lat]` positions; the first ring is the exterior
fn parse_polygon(rings: &Value) -> Result<Polygon> {
    let rings = rings
        .as_array()
        .ok_or_else(|| anyhow!("Polygon coordinates must be an array of rings"))?;

    let mut parsed = rings.iter().map(parse_ring).collect::<Result<Vec<_>>>()?.into_iter();
    let exterior = parsed
        .next()
        .ok_or_else(|| anyhow!("Polygon without an exterior ring"))?;

    Ok(Polygon::new(exterior, parsed.collect()))
}

fn parse_ring(ring: &Value) -> Result<Vec<GridPoint>> {
    let positions = ring
        .as_array()
        .ok_or_else(|| anyhow!("ring must be an array of positions"))?;

    positions
        .iter()
        .map(|pos| {
            let lon = pos.get(0).and_then(Value::as_f64);
            let lat = pos.get(1).and_then(Value::as_f64);
            match (lat, lon) {
                (Some(lat), Some(lon)) => Ok(GridPoint::new(lat, lon)),
                _ => Err(anyhow!("invalid position {}", pos)),
            }
        })
        .collect()
}
