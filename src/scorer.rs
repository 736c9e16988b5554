//! Scoring Engine - main coordinator for scoring a region
//!
//! Walks the grid, evaluates every factor and exclusion mask per point, and
//! aggregates into one `ScoredPoint` per grid point. Points are scored in
//! batches on a Rayon pool; batch results are collected in index order, so
//! the output keeps the grid's row-major order.
//!
//! All per-point work reads immutable configuration and `Arc`-shared
//! datasets only, so no locking is involved.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rayon::prelude::*;

use crate::aggregate::Aggregator;
use crate::config::{DegradedPolicy, EngineOptions, SuitabilityConfig};
use crate::data::{Dataset, DatasetCatalog};
use crate::error::{ScoringError, ScoringResult};
use crate::exclusion::{is_excluded, matching_masks, ExclusionMask};
use crate::factors::{Factor, FactorSource, ProximityFactor, RasterFactor};
use crate::grid::{BoundingRegion, Grid, GridPoint};
use crate::output::{RunSummary, ScoredPoint, ScoringRun};

/// Cooperative cancellation flag, checked between batches
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Main site scorer
pub struct ScoringEngine {
    grid: Grid,
    factors: Vec<Factor>,
    masks: Vec<Arc<dyn ExclusionMask>>,
    aggregator: Aggregator,
    options: EngineOptions,
    pool: rayon::ThreadPool,
}

impl ScoringEngine {
    /// Build an engine from already-constructed factors and masks
    ///
    /// Validates the region, the weight sum and factor ids before anything
    /// is scored.
    pub fn new(
        region: BoundingRegion,
        factors: Vec<Factor>,
        masks: Vec<Arc<dyn ExclusionMask>>,
        options: EngineOptions,
    ) -> ScoringResult<Self> {
        let grid = Grid::new(region)?;
        let aggregator = Aggregator::new(factors.iter().map(|f| f.weight).collect())?;

        let mut ids: Vec<&str> = factors.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(dup) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(ScoringError::InvalidConfig(format!("duplicate factor id '{}'", dup[0])));
        }
        if options.batch_size == 0 {
            return Err(ScoringError::InvalidConfig("batch size must be positive".to_string()));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|i| format!("site-scorer-{}", i))
            .build()
            .map_err(|e| {
                ScoringError::InvalidConfig(format!("failed to start worker pool: {}", e))
            })?;

        Ok(Self {
            grid,
            factors,
            masks,
            aggregator,
            options,
            pool,
        })
    }

    /// Validate a configuration, load its datasets and build the engine
    pub fn from_config(config: &SuitabilityConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!("Loading datasets...");
        let catalog = DatasetCatalog::load(config)?;
        Ok(Self::from_catalog(config, &catalog)?)
    }

    /// Build the engine from a configuration and pre-loaded datasets
    pub fn from_catalog(
        config: &SuitabilityConfig,
        catalog: &DatasetCatalog,
    ) -> ScoringResult<Self> {
        let lookup = |name: &str| {
            catalog.get(name).ok_or_else(|| {
                ScoringError::InvalidConfig(format!("dataset '{}' is not loaded", name))
            })
        };

        let mut factors = Vec::with_capacity(config.factors.len());
        for def in &config.factors {
            let source: Arc<dyn FactorSource> = match lookup(&def.dataset_ref)? {
                Dataset::Points(features) | Dataset::Lines(features) => {
                    Arc::new(ProximityFactor::new(def.dataset_ref.clone(), features.clone()))
                }
                Dataset::Raster(raster) => {
                    Arc::new(RasterFactor::new(def.dataset_ref.clone(), raster.clone()))
                }
                Dataset::Hazard(_) => {
                    return Err(ScoringError::InvalidConfig(format!(
                        "factor '{}' cannot read hazard dataset '{}'",
                        def.id, def.dataset_ref
                    )))
                }
            };

            let curve = def
                .curve
                .resolve(source.observed_range())
                .map_err(|e| e.for_factor(&def.id))?;

            factors.push(Factor::new(def.id.clone(), def.weight, source, curve));
        }

        let mut masks: Vec<Arc<dyn ExclusionMask>> =
            Vec::with_capacity(config.exclusion_masks.len());
        for def in &config.exclusion_masks {
            match lookup(&def.dataset_ref)? {
                Dataset::Hazard(hazard) => masks.push(hazard.clone()),
                other => {
                    return Err(ScoringError::InvalidConfig(format!(
                        "exclusion mask '{}' cannot read {:?} dataset '{}'",
                        def.id,
                        other.kind(),
                        def.dataset_ref
                    )))
                }
            }
        }

        Self::new(config.region, factors, masks, config.engine)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn factor_ids(&self) -> Vec<String> {
        self.factors.iter().map(|f| f.id.clone()).collect()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Score a single point (any coordinate, not only grid points)
    ///
    /// Never fails: unavailable factors degrade the point. A point with no
    /// usable factor scores 0.
    pub fn score_point(&self, point: &GridPoint) -> ScoredPoint {
        let mut per_factor_score = BTreeMap::new();
        let mut scores = Vec::with_capacity(self.factors.len());

        for factor in &self.factors {
            match factor.score_at(point) {
                Ok(reading) => {
                    per_factor_score.insert(factor.id.clone(), reading.score);
                    scores.push(Some(reading.score));
                }
                Err(e) => {
                    tracing::trace!("Factor {} unavailable: {}", factor.id, e);
                    scores.push(None);
                }
            }
        }

        let excluded = is_excluded(point, &self.masks);
        let aggregate = self.aggregator.final_score(&scores, excluded);

        ScoredPoint {
            lat: point.lat,
            lon: point.lon,
            per_factor_score,
            excluded,
            degraded: aggregate.degraded,
            final_score: aggregate.score.unwrap_or(0.0),
        }
    }

    /// Score arbitrary points on the engine's worker pool, in input order
    pub fn score_points(&self, points: &[GridPoint]) -> Vec<ScoredPoint> {
        self.pool
            .install(|| points.par_iter().map(|p| self.score_point(p)).collect())
    }

    /// Ids of the exclusion masks containing `point`
    pub fn matching_masks(&self, point: &GridPoint) -> Vec<&str> {
        matching_masks(point, &self.masks)
    }

    /// Whether a scored point is emitted under the configured policy
    ///
    /// `Omit` drops degraded points whose score depended on missing data;
    /// excluded points are kept since exclusion alone fixes their score.
    fn keep(&self, scored: &ScoredPoint) -> bool {
        match self.options.degraded_policy {
            DegradedPolicy::Renormalize => true,
            DegradedPolicy::Omit => !scored.degraded || scored.excluded,
        }
    }

    /// Score the whole grid
    ///
    /// Cancellation is checked at the start of every batch. A cancelled run
    /// returns `Err(Cancelled)` and discards all partial output.
    pub fn run(&self, cancel: &CancellationToken) -> ScoringResult<ScoringRun> {
        let start = Instant::now();
        let points: Vec<GridPoint> = self.grid.points().collect();
        let batch_size = self.options.batch_size;
        let n_batches = points.len().div_ceil(batch_size);
        let (rows, cols) = self.grid.dimensions();

        tracing::info!(
            "Scoring {} points ({}x{}) with {} factors, {} masks in {} batches on {} threads",
            points.len(),
            rows,
            cols,
            self.factors.len(),
            self.masks.len(),
            n_batches,
            self.pool.current_num_threads()
        );

        let batches: Vec<Vec<ScoredPoint>> = self.pool.install(|| {
            points
                .par_chunks(batch_size)
                .enumerate()
                .map(|(batch_idx, batch)| {
                    if cancel.is_cancelled() {
                        return Err(ScoringError::Cancelled);
                    }
                    let scored: Vec<ScoredPoint> =
                        batch.iter().map(|p| self.score_point(p)).collect();
                    tracing::debug!(
                        "Batch {}/{} scored ({} points)",
                        batch_idx + 1,
                        n_batches,
                        batch.len()
                    );
                    Ok(scored)
                })
                .collect::<ScoringResult<Vec<_>>>()
        })?;

        let mut summary = RunSummary {
            grid_points: points.len(),
            batches: n_batches,
            ..RunSummary::default()
        };

        let mut output = Vec::with_capacity(points.len());
        for scored in batches.into_iter().flatten() {
            summary.excluded += scored.excluded as usize;
            summary.degraded += scored.degraded as usize;
            if self.keep(&scored) {
                output.push(scored);
            } else {
                summary.omitted += 1;
            }
        }

        summary.emitted = output.len();
        summary.max_score = output.iter().map(|p| p.final_score).reduce(f64::max);
        summary.elapsed_ms = start.elapsed().as_millis() as u64;

        if summary.degraded > 0 {
            tracing::warn!(
                "{} of {} points degraded by unavailable data ({:?} policy, {} omitted)",
                summary.degraded,
                summary.grid_points,
                self.options.degraded_policy,
                summary.omitted
            );
        }
        tracing::info!(
            "Scored {} points in {} ms ({} excluded)",
            summary.emitted,
            summary.elapsed_ms,
            summary.excluded
        );

        Ok(ScoringRun {
            factor_ids: self.factor_ids(),
            dimensions: (rows, cols),
            points: output,
            summary,
        })
    }

    /// Sequential reference implementation of [`run`](Self::run)
    ///
    /// Same output, single thread; used to check the parallel path.
    pub fn run_sequential(&self) -> ScoringRun {
        let start = Instant::now();
        let (rows, cols) = self.grid.dimensions();
        let mut summary = RunSummary {
            grid_points: self.grid.len(),
            batches: 1,
            ..RunSummary::default()
        };

        let mut output = Vec::with_capacity(self.grid.len());
        for point in self.grid.points() {
            let scored = self.score_point(&point);
            summary.excluded += scored.excluded as usize;
            summary.degraded += scored.degraded as usize;
            if self.keep(&scored) {
                output.push(scored);
            } else {
                summary.omitted += 1;
            }
        }

        summary.emitted = output.len();
        summary.max_score = output.iter().map(|p| p.final_score).reduce(f64::max);
        summary.elapsed_ms = start.elapsed().as_millis() as u64;

        ScoringRun {
            factor_ids: self.factor_ids(),
            dimensions: (rows, cols),
            points: output,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exclusion::{HazardBoundary, Polygon};
    use crate::factors::{FeatureSet, RasterGrid};
    use crate::utils::normalization::{reference_curves, ScoringCurve};
    use approx::assert_relative_eq;
    use std::sync::atomic::AtomicUsize;

    /// Source returning a fixed raw value, or unavailable inside a latitude band
    struct FixedSource {
        value: f64,
        gap_above_lat: Option<f64>,
    }

    impl FactorSource for FixedSource {
        fn source_id(&self) -> &str {
            "fixed"
        }

        fn evaluate(&self, point: &GridPoint) -> ScoringResult<f64> {
            match self.gap_above_lat {
                Some(lat) if point.lat > lat => Err(ScoringError::DataUnavailable {
                    source_id: "fixed".to_string(),
                    lat: point.lat,
                    lon: point.lon,
                    reason: "gap".to_string(),
                }),
                _ => Ok(self.value),
            }
        }
    }

    fn fixed(id: &str, weight: f64, score: f64) -> Factor {
        // Constant curve so the raw value does not matter
        Factor::new(
            id,
            weight,
            Arc::new(FixedSource { value: 0.0, gap_above_lat: None }),
            ScoringCurve::new([(0.0, score)]).unwrap(),
        )
    }

    fn region() -> BoundingRegion {
        BoundingRegion::new(-28.0, -27.0, 152.0, 153.0, 0.25)
    }

    fn options(batch_size: usize) -> EngineOptions {
        EngineOptions {
            threads: 4,
            batch_size,
            degraded_policy: DegradedPolicy::Renormalize,
        }
    }

    fn reference_factors() -> Vec<Factor> {
        vec![
            fixed("substation", 0.35, 10.0),
            fixed("transmission", 0.15, 8.0),
            fixed("road", 0.25, 6.0),
            fixed("temperature", 0.25, 9.0),
        ]
    }

    #[test]
    fn test_weighted_example_every_point() {
        let engine = ScoringEngine::new(region(), reference_factors(), vec![], options(7)).unwrap();
        let run = engine.run(&CancellationToken::new()).unwrap();

        assert_eq!(run.points.len(), 25);
        assert_eq!(run.dimensions, (5, 5));
        for p in &run.points {
            assert_relative_eq!(p.final_score, 8.45, epsilon = 1e-12);
            assert!(!p.excluded && !p.degraded);
            assert_eq!(p.per_factor_score.len(), 4);
        }
    }

    #[test]
    fn test_output_preserves_grid_order() {
        let engine = ScoringEngine::new(region(), reference_factors(), vec![], options(3)).unwrap();
        let run = engine.run(&CancellationToken::new()).unwrap();

        let expected: Vec<GridPoint> = engine.grid().points().collect();
        let actual: Vec<GridPoint> = run.points.iter().map(|p| p.point()).collect();
        assert_eq!(actual, expected);
        assert_eq!(run, {
            let mut seq = engine.run_sequential();
            seq.summary.elapsed_ms = run.summary.elapsed_ms;
            seq.summary.batches = run.summary.batches;
            seq
        });
    }

    #[test]
    fn test_flood_mask_zeroes_ideal_point() {
        let flood: Arc<dyn ExclusionMask> = Arc::new(HazardBoundary::new(
            "flood",
            vec![Polygon::new(
                vec![
                    GridPoint::new(-27.6, 152.9),
                    GridPoint::new(-27.6, 153.1),
                    GridPoint::new(-27.4, 153.1),
                    GridPoint::new(-27.4, 152.9),
                ],
                vec![],
            )],
        ));
        let factors = vec![fixed("a", 0.5, 10.0), fixed("b", 0.5, 10.0)];
        let engine = ScoringEngine::new(region(), factors, vec![flood], options(8)).unwrap();
        let run = engine.run(&CancellationToken::new()).unwrap();

        let inside = run
            .points
            .iter()
            .find(|p| p.lat == -27.5 && p.lon == 153.0)
            .unwrap();
        assert!(inside.excluded);
        assert_eq!(inside.final_score, 0.0);

        let outside = run.points.iter().find(|p| p.lat == -28.0 && p.lon == 152.0).unwrap();
        assert_relative_eq!(outside.final_score, 10.0);
        assert_eq!(run.summary.excluded, 1);
    }

    #[test]
    fn test_missing_data_renormalises_without_aborting() {
        let gappy = Factor::new(
            "temperature",
            0.5,
            Arc::new(FixedSource { value: 0.0, gap_above_lat: Some(-27.5) }),
            ScoringCurve::new([(0.0, 2.0)]).unwrap(),
        );
        let factors = vec![fixed("substation", 0.5, 8.0), gappy];
        let engine = ScoringEngine::new(region(), factors, vec![], options(4)).unwrap();
        let run = engine.run(&CancellationToken::new()).unwrap();

        // Rows at -27.25 and -27.0 lack temperature
        assert_eq!(run.summary.degraded, 10);
        assert_eq!(run.points.len(), 25);
        for p in &run.points {
            if p.lat > -27.5 {
                assert!(p.degraded);
                assert!(!p.per_factor_score.contains_key("temperature"));
                assert_relative_eq!(p.final_score, 8.0);
            } else {
                assert!(!p.degraded);
                assert_relative_eq!(p.final_score, 5.0);
            }
        }
    }

    #[test]
    fn test_omit_policy_drops_degraded_points() {
        let gappy = Factor::new(
            "temperature",
            0.5,
            Arc::new(FixedSource { value: 0.0, gap_above_lat: Some(-27.5) }),
            ScoringCurve::new([(0.0, 2.0)]).unwrap(),
        );
        let factors = vec![fixed("substation", 0.5, 8.0), gappy];
        let mut opts = options(4);
        opts.degraded_policy = DegradedPolicy::Omit;
        let engine = ScoringEngine::new(region(), factors, vec![], opts).unwrap();
        let run = engine.run(&CancellationToken::new()).unwrap();

        assert_eq!(run.points.len(), 15);
        assert_eq!(run.summary.omitted, 10);
        assert!(run.points.iter().all(|p| !p.degraded));
        assert!(run.points.windows(2).all(|w| (w[0].lat, w[0].lon) < (w[1].lat, w[1].lon)));
    }

    #[test]
    fn test_cancelled_run_returns_error() {
        let engine = ScoringEngine::new(region(), reference_factors(), vec![], options(2)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(engine.run(&cancel), Err(ScoringError::Cancelled));
    }

    /// Source that cancels the run on its `cancel_at`-th evaluation
    struct CancellingSource {
        token: CancellationToken,
        cancel_at: usize,
        calls: AtomicUsize,
    }

    impl FactorSource for CancellingSource {
        fn source_id(&self) -> &str {
            "cancelling"
        }

        fn evaluate(&self, _point: &GridPoint) -> ScoringResult<f64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.cancel_at {
                self.token.cancel();
            }
            Ok(0.0)
        }
    }

    #[test]
    fn test_cancel_mid_run_stops_at_next_batch() {
        let cancel = CancellationToken::new();
        let source = Arc::new(CancellingSource {
            token: cancel.clone(),
            cancel_at: 3,
            calls: AtomicUsize::new(0),
        });
        let factor = Factor::new(
            "only",
            1.0,
            source.clone(),
            ScoringCurve::new([(0.0, 5.0)]).unwrap(),
        );
        let opts = EngineOptions {
            threads: 1,
            ..options(2)
        };
        let engine = ScoringEngine::new(region(), vec![factor], vec![], opts).unwrap();

        // 25 points in 13 batches; cancelled while scoring the second batch
        assert_eq!(engine.run(&cancel), Err(ScoringError::Cancelled));
        let calls = source.calls.load(Ordering::SeqCst);
        assert!(calls >= 3);
        assert!(calls < engine.grid().len(), "scored {} points after cancel", calls);
    }

    #[test]
    fn test_score_points_keeps_input_order() {
        let flood: Arc<dyn ExclusionMask> = Arc::new(HazardBoundary::new(
            "flood",
            vec![Polygon::new(
                vec![
                    GridPoint::new(-27.6, 152.9),
                    GridPoint::new(-27.6, 153.1),
                    GridPoint::new(-27.4, 153.1),
                    GridPoint::new(-27.4, 152.9),
                ],
                vec![],
            )],
        ));
        let engine =
            ScoringEngine::new(region(), reference_factors(), vec![flood], options(4)).unwrap();

        let points: Vec<GridPoint> = (0..50)
            .map(|i| GridPoint::new(-28.0 + i as f64 * 0.02, 152.0 + i as f64 * 0.02))
            .collect();
        let scored = engine.score_points(&points);

        assert_eq!(scored.len(), points.len());
        for (p, s) in points.iter().zip(&scored) {
            assert_eq!(*s, engine.score_point(p));
        }

        let flooded = GridPoint::new(-27.5, 153.0);
        assert_eq!(engine.matching_masks(&flooded), vec!["flood"]);
        assert!(engine.matching_masks(&GridPoint::new(-28.0, 152.0)).is_empty());
    }

    #[test]
    fn test_invalid_weights_rejected_before_scoring() {
        let factors = vec![fixed("a", 0.6, 10.0), fixed("b", 0.6, 10.0)];
        let result = ScoringEngine::new(region(), factors, vec![], options(8));
        assert!(matches!(result, Err(ScoringError::InvalidWeights(_))));

        let dupes = vec![fixed("a", 0.5, 10.0), fixed("a", 0.5, 10.0)];
        let result = ScoringEngine::new(region(), dupes, vec![], options(8));
        assert!(matches!(result, Err(ScoringError::InvalidConfig(_))));
    }

    #[test]
    fn test_real_sources_end_to_end() {
        let metres_per_degree = crate::geo::EARTH_RADIUS_M.to_radians();
        let site = GridPoint::new(-27.5, 152.5);

        // Substation 500 m north of the site, a transmission line 20.5 km south
        let substations = Arc::new(FeatureSet::from_points(vec![GridPoint::new(
            site.lat + 500.0 / metres_per_degree,
            site.lon,
        )]));
        let line_lat = site.lat - 20_500.0 / metres_per_degree;
        let lines = Arc::new(FeatureSet::from_lines(vec![vec![
            GridPoint::new(line_lat, 150.0),
            GridPoint::new(line_lat, 155.0),
        ]]));
        let temperatures = vec![20.0, 21.0, 22.0, 23.0, 24.0, 25.0, 26.0, 27.0, 28.0];
        let raster = Arc::new(RasterGrid::new(-28.0, 152.0, 0.5, 0.5, 3, 3, temperatures).unwrap());

        let factors = vec![
            Factor::new(
                "substation",
                0.5,
                Arc::new(ProximityFactor::new("substations", substations)),
                reference_curves::substation(),
            ),
            Factor::new(
                "transmission",
                0.25,
                Arc::new(ProximityFactor::new("lines", lines)),
                reference_curves::transmission_line(),
            ),
            Factor::new(
                "temperature",
                0.25,
                Arc::new(RasterFactor::new("temperature", raster)),
                ScoringCurve::inverted_range(20.0, 28.0).unwrap(),
            ),
        ];
        let engine = ScoringEngine::new(region(), factors, vec![], options(16)).unwrap();
        let scored = engine.score_point(&site);

        assert_relative_eq!(scored.per_factor_score["substation"], 10.0);
        assert_relative_eq!(scored.per_factor_score["transmission"], 6.0, epsilon = 1e-3);
        // Nearest cell (row 1, col 1) holds 24.0 -> 10 - 9 * 4/8
        assert_relative_eq!(scored.per_factor_score["temperature"], 5.5, epsilon = 1e-12);
        let expected = 0.5 * 10.0 + 0.25 * 6.0 + 0.25 * 5.5;
        assert_relative_eq!(scored.final_score, expected, epsilon = 1e-3);
    }
}
