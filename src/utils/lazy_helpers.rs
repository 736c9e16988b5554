//! LazyFrame materialization helpers with column validation
//!
//! Provides safe, explicit patterns for reading dataset files through Polars
//! so that a missing `lat`/`lon`/`value` column fails loudly at load time
//! instead of silently producing an empty factor.

use polars::prelude::*;
use anyhow::{Context, Result, anyhow};
use std::collections::HashSet;
use std::path::Path;

/// Open a CSV or Parquet file lazily, chosen by extension
///
/// # Errors
/// Returns error for unknown extensions or unreadable files.
pub fn scan_table(path: &Path) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to scan parquet: {:?}", path)),
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .with_context(|| format!("Failed to scan CSV: {:?}", path)),
        other => Err(anyhow!(
            "Unsupported table format '{}' for {:?} (expected .csv or .parquet)",
            other, path
        )),
    }
}

/// Materialize LazyFrame with explicit column list and validation
///
/// # Arguments
/// * `lazy` - LazyFrame to materialize
/// * `columns` - Required column names
/// * `context` - Context for error messages (e.g., "substations dataset")
///
/// # Returns
/// DataFrame with exactly the specified columns
///
/// # Errors
/// Returns error if:
/// - Materialization fails
/// - Any required column is missing from result
pub fn materialize_with_columns(
    lazy: &LazyFrame,
    columns: &[&str],
    context: &str,
) -> Result<DataFrame> {
    let col_exprs: Vec<Expr> = columns.iter()
        .map(|&name| col(name))
        .collect();

    let df = lazy
        .clone()
        .select(&col_exprs)
        .collect()
        .with_context(|| format!("{}: Failed to materialize columns {:?}", context, columns))?;

    // VALIDATE: Check all expected columns present
    let actual_cols: HashSet<String> = df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    for &expected in columns {
        if !actual_cols.contains(expected) {
            return Err(anyhow!(
                "{}: Missing expected column '{}'. Available columns: {:?}",
                context, expected, actual_cols
            ));
        }
    }

    Ok(df)
}

/// Read a numeric column as `f64`, casting integer columns
///
/// Nulls are preserved as `None` so callers decide how to treat gaps.
pub fn f64_values(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::Float64)
        .with_context(|| format!("{}: Column '{}' is not numeric", context, name))?;

    let values = column.f64()
        .with_context(|| format!("{}: Column '{}' is not Float64", context, name))?;

    Ok(values.into_iter().collect())
}

/// Read a column as strings, casting numeric ids
pub fn string_values(df: &DataFrame, name: &str, context: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)
        .with_context(|| format!("{}: Missing {} column", context, name))?
        .cast(&DataType::String)
        .with_context(|| format!("{}: Column '{}' cannot be read as text", context, name))?;

    let values = column.str()
        .with_context(|| format!("{}: Column '{}' is not string type", context, name))?;

    Ok(values.into_iter().map(|v| v.map(|s| s.to_string())).collect())
}
