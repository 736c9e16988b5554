//! Utility modules for suitability scoring
//!
//! Contains shared functionality used across multiple factors:
//! - Normalization: Piecewise-linear scoring curves
//! - LazyFrame helpers: Dataset materialisation with column validation

pub mod normalization;
pub mod lazy_helpers;

// Re-export commonly used types
pub use normalization::{
    reference_curves, Breakpoint, ScoringCurve, MAX_FACTOR_SCORE, MIN_FACTOR_SCORE,
};
pub use lazy_helpers::{materialize_with_columns, scan_table, f64_values, string_values};
