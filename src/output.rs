//! Scored output and writers
//!
//! `ScoredPoint` is the terminal record of a run. The map layer consumes the
//! flat `[lat, lon, intensity]` triples produced by [`heatmap_triples`]; the
//! JSON, CSV and Parquet writers keep the per-factor breakdown for diagnostics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::GridPoint;

/// Final record for one grid point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub lat: f64,
    pub lon: f64,
    /// Factor id -> score in [1, 10]; factors unavailable at this point are absent
    pub per_factor_score: BTreeMap<String, f64>,
    pub excluded: bool,
    pub degraded: bool,
    pub final_score: f64,
}

impl ScoredPoint {
    pub fn point(&self) -> GridPoint {
        GridPoint::new(self.lat, self.lon)
    }
}

/// Counts and timing for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub grid_points: usize,
    pub emitted: usize,
    pub excluded: usize,
    pub degraded: usize,
    pub omitted: usize,
    pub batches: usize,
    pub elapsed_ms: u64,
    /// Highest final score among emitted points
    pub max_score: Option<f64>,
}

/// Output of a completed run, in grid order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRun {
    pub factor_ids: Vec<String>,
    /// (rows, cols) of the generating grid
    pub dimensions: (usize, usize),
    pub points: Vec<ScoredPoint>,
    pub summary: RunSummary,
}

impl ScoringRun {
    pub fn heatmap(&self) -> Vec<HeatmapPoint> {
        heatmap_triples(&self.points)
    }
}

/// `[lat, lon, intensity]`, serialised as a three-element array
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint(pub f64, pub f64, pub f64);

/// Flat heatmap triples, intensity = final score
pub fn heatmap_triples(points: &[ScoredPoint]) -> Vec<HeatmapPoint> {
    points
        .iter()
        .map(|p| HeatmapPoint(p.lat, p.lon, p.final_score))
        .collect()
}

// ============================================================================
// Writers
// ============================================================================

/// Tabular view: lat, lon, final_score, excluded, degraded, score_<factor>
pub fn to_dataframe(points: &[ScoredPoint], factor_ids: &[String]) -> Result<DataFrame> {
    let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.lon).collect();
    let finals: Vec<f64> = points.iter().map(|p| p.final_score).collect();
    let excluded: Vec<bool> = points.iter().map(|p| p.excluded).collect();
    let degraded: Vec<bool> = points.iter().map(|p| p.degraded).collect();

    let mut df = df![
        "lat" => lats,
        "lon" => lons,
        "final_score" => finals,
        "excluded" => excluded,
        "degraded" => degraded,
    ]
    .with_context(|| "Failed to build output frame")?;

    for id in factor_ids {
        let scores: Vec<Option<f64>> = points
            .iter()
            .map(|p| p.per_factor_score.get(id).copied())
            .collect();
        let name = format!("score_{}", id);
        df.with_column(Series::new(name.as_str().into(), scores))
            .with_context(|| format!("Failed to add column {}", name))?;
    }

    Ok(df)
}

pub fn write_json(run: &ScoringRun, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), run)
        .with_context(|| format!("Failed to write JSON to {:?}", path))
}

pub fn write_csv(run: &ScoringRun, path: &Path) -> Result<()> {
    let mut df = to_dataframe(&run.points, &run.factor_ids)?;
    let mut file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write CSV to {:?}", path))
}

pub fn write_parquet(run: &ScoringRun, path: &Path) -> Result<()> {
    let mut df = to_dataframe(&run.points, &run.factor_ids)?;
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("Failed to write Parquet to {:?}", path))?;
    Ok(())
}

/// Write a run, format chosen by extension (json, csv, parquet)
pub fn write_run(run: &ScoringRun, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "json" => write_json(run, path),
        "csv" => write_csv(run, path),
        "parquet" => write_parquet(run, path),
        other => bail!("Unsupported output format '{}' for {:?}", other, path),
    }
}
