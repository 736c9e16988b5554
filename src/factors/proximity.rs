//! Proximity Factor - distance to the nearest feature
//!
//! Backs substation, transmission-line and major-road factors. Features are
//! point sites and/or polylines; the raw value is the great-circle distance
//! in metres from the query point to the closest one.

use std::sync::Arc;

use crate::error::{ScoringError, ScoringResult};
use crate::factors::FactorSource;
use crate::geo::{distance_to_segment_m, haversine_m};
use crate::grid::GridPoint;

/// Immutable point and polyline features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    points: Vec<GridPoint>,
    lines: Vec<Vec<GridPoint>>,
}

impl FeatureSet {
    pub fn new(points: Vec<GridPoint>, lines: Vec<Vec<GridPoint>>) -> Self {
        Self { points, lines }
    }

    pub fn from_points(points: Vec<GridPoint>) -> Self {
        Self::new(points, Vec::new())
    }

    pub fn from_lines(lines: Vec<Vec<GridPoint>>) -> Self {
        Self::new(Vec::new(), lines)
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn lines(&self) -> &[Vec<GridPoint>] {
        &self.lines
    }

    /// Number of features (points plus polylines)
    pub fn len(&self) -> usize {
        self.points.len() + self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.lines.iter().all(|l| l.is_empty())
    }

    /// Distance in metres to the nearest feature, `None` when there are none
    pub fn nearest_distance_m(&self, p: &GridPoint) -> Option<f64> {
        let point_best = self.points.iter().map(|f| haversine_m(p, f));

        let line_best = self.lines.iter().filter_map(|line| match line.as_slice() {
            [] => None,
            [only] => Some(haversine_m(p, only)),
            vertices => vertices
                .windows(2)
                .map(|seg| distance_to_segment_m(p, &seg[0], &seg[1]))
                .reduce(f64::min),
        });

        point_best.chain(line_best).reduce(f64::min)
    }
}

/// Distance-to-nearest-feature factor source
#[derive(Debug, Clone)]
pub struct ProximityFactor {
    source_id: String,
    features: Arc<FeatureSet>,
}

impl ProximityFactor {
    pub fn new(source_id: impl Into<String>, features: Arc<FeatureSet>) -> Self {
        Self {
            source_id: source_id.into(),
            features,
        }
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }
}

impl FactorSource for ProximityFactor {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn evaluate(&self, point: &GridPoint) -> ScoringResult<f64> {
        self.features
            .nearest_distance_m(point)
            .ok_or_else(|| ScoringError::DataUnavailable {
                source_id: self.source_id.clone(),
                lat: point.lat,
                lon: point.lon,
                reason: "dataset has no features".to_string(),
            })
    }
}
