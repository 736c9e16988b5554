// Axum API Server Module
//
// Purpose: serve a precomputed scoring run (heatmap, points, ranked sites,
// map presentation) and score ad-hoc points against the loaded datasets.

#[cfg(feature = "api")]
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};

#[cfg(feature = "api")]
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

#[cfg(feature = "api")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "api")]
use std::path::Path;

#[cfg(feature = "api")]
use std::sync::Arc;

#[cfg(feature = "api")]
use crate::config::SuitabilityConfig;

#[cfg(feature = "api")]
use crate::grid::GridPoint;

#[cfg(feature = "api")]
use crate::output::{ScoredPoint, ScoringRun};

#[cfg(feature = "api")]
use crate::presentation::{rank_sites, MapPresentation, PresentationConfig};

#[cfg(feature = "api")]
use crate::scorer::{CancellationToken, ScoringEngine};

/// Largest batch accepted by `POST /api/score`
#[cfg(feature = "api")]
pub const MAX_SCORE_BATCH: usize = 10_000;

/// Largest `limit` accepted by `GET /api/sites`
#[cfg(feature = "api")]
pub const MAX_SITES: usize = 100;

// ============================================================================
// Application State
// ============================================================================

#[cfg(feature = "api")]
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScoringEngine>,
    /// Grid run computed at startup
    pub run: Arc<ScoringRun>,
    pub presentation_config: Arc<PresentationConfig>,
    pub presentation: Arc<MapPresentation>,
}

#[cfg(feature = "api")]
impl AppState {
    /// Load configuration and datasets, then score the whole region once
    pub async fn new(config_path: &Path) -> anyhow::Result<Self> {
        tracing::info!("Loading configuration from {:?}...", config_path);
        let config = SuitabilityConfig::load(config_path)?;

        tokio::task::spawn_blocking(move || {
            tracing::info!("Initializing scoring engine...");
            let engine = ScoringEngine::from_config(&config)?;
            Self::from_engine(engine, config.presentation)
        })
        .await?
    }

    /// Score the engine's grid and build the presentation payload
    pub fn from_engine(
        engine: ScoringEngine,
        presentation_config: PresentationConfig,
    ) -> anyhow::Result<Self> {
        let run = engine.run(&CancellationToken::new())?;
        let presentation = MapPresentation::build(&presentation_config, &run.points);

        tracing::info!(
            "Startup run: {} points, {} candidate sites",
            run.points.len(),
            presentation.sites.len()
        );

        Ok(Self {
            engine: Arc::new(engine),
            run: Arc::new(run),
            presentation_config: Arc::new(presentation_config),
            presentation: Arc::new(presentation),
        })
    }
}

// ============================================================================
// Router
// ============================================================================

#[cfg(feature = "api")]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Precomputed run
        .route("/api/heatmap", get(get_heatmap))
        .route("/api/points", get(get_points))
        .route("/api/summary", get(get_summary))
        .route("/api/sites", get(get_sites))
        .route("/api/presentation", get(get_presentation))

        // Ad-hoc scoring
        .route("/api/score", post(score_points))

        // Middleware (applied in reverse order)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request Types
// ============================================================================

#[cfg(feature = "api")]
#[derive(Debug, Deserialize)]
pub struct PointsQuery {
    /// Only points scoring at least this much
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

#[cfg(feature = "api")]
#[derive(Debug, Deserialize)]
pub struct SitesQuery {
    pub limit: Option<usize>,
}

#[cfg(feature = "api")]
#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub points: Vec<GridPoint>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Ad-hoc score plus the hazard masks that excluded the point
#[cfg(feature = "api")]
#[derive(Debug, Serialize)]
pub struct PointScore {
    #[serde(flatten)]
    pub scored: ScoredPoint,
    pub exclusion_masks: Vec<String>,
}

// ============================================================================
// Endpoint Handlers
// ============================================================================

#[cfg(feature = "api")]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "points": state.run.points.len(),
        "factors": state.run.factor_ids,
    }))
}

#[cfg(feature = "api")]
async fn get_heatmap(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.presentation.heatmap.clone())
}

#[cfg(feature = "api")]
async fn get_points(
    State(state): State<AppState>,
    Query(query): Query<PointsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let min_score = query.min_score.unwrap_or(f64::NEG_INFINITY);
    if min_score.is_nan() {
        return Err(AppError::BadRequest("min_score must be a number".to_string()));
    }

    let data: Vec<_> = state
        .run
        .points
        .iter()
        .filter(|p| p.final_score >= min_score)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Ok(Json(serde_json::json!({
        "rows": data.len(),
        "data": data
    })))
}

#[cfg(feature = "api")]
async fn get_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.run.summary.clone())
}

#[cfg(feature = "api")]
async fn get_sites(
    State(state): State<AppState>,
    Query(query): Query<SitesQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(state.presentation_config.candidate_sites);
    if limit == 0 || limit > MAX_SITES {
        return Err(AppError::BadRequest(format!("limit must be between 1 and {}", MAX_SITES)));
    }

    let sites = rank_sites(&state.run.points, limit, state.presentation_config.min_separation_km);

    Ok(Json(serde_json::json!({
        "rows": sites.len(),
        "data": sites
    })))
}

#[cfg(feature = "api")]
async fn get_presentation(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.presentation.as_ref().clone())
}

#[cfg(feature = "api")]
async fn score_points(
    State(state): State<AppState>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = payload.points.len();
    if count == 0 || count > MAX_SCORE_BATCH {
        return Err(AppError::BadRequest(format!(
            "expected 1 to {} points, got {}",
            MAX_SCORE_BATCH, count
        )));
    }
    if let Some(p) = payload
        .points
        .iter()
        .find(|p| !(-90.0..=90.0).contains(&p.lat) || !(-180.0..=180.0).contains(&p.lon))
    {
        return Err(AppError::BadRequest(format!("invalid coordinate ({}, {})", p.lat, p.lon)));
    }

    tracing::info!("Scoring {} ad-hoc points", count);

    // CPU-bound work: run in blocking thread pool, scored on the engine's workers
    let engine = state.engine.clone();
    let scored = tokio::task::spawn_blocking(move || {
        engine
            .score_points(&payload.points)
            .into_iter()
            .map(|scored| {
                let exclusion_masks = engine
                    .matching_masks(&scored.point())
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                PointScore { scored, exclusion_masks }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?;

    Ok(Json(serde_json::json!({
        "rows": scored.len(),
        "data": scored
    })))
}

// ============================================================================
// Error Handling
// ============================================================================

#[cfg(feature = "api")]
#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

#[cfg(feature = "api")]
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
