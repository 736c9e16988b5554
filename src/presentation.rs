//! Map presentation payload
//!
//! Everything the external map layer needs to draw a run: title and footer,
//! initial view, base tile layers, marker and overlay styles, the heatmap
//! and the ranked candidate sites. The payload is built once per run and
//! never mutated afterwards; styling lives in configuration, not in global
//! state.

use serde::{Deserialize, Serialize};

use crate::geo::haversine_m;
use crate::grid::GridPoint;
use crate::output::{heatmap_triples, HeatmapPoint, ScoredPoint};

/// Labels for the first ranked sites; later ranks are numbered
const RANK_LABELS: [&str; 3] = ["Most desirable location", "Secondary location", "Third location"];

// ============================================================================
// Configuration
// ============================================================================

/// One selectable tile layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseLayer {
    pub name: String,
    pub url: String,
    pub attribution: String,
    /// Selected when the map opens
    #[serde(default)]
    pub checked: bool,
}

impl BaseLayer {
    fn new(name: &str, url: &str, attribution: &str, checked: bool) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            attribution: attribution.to_string(),
            checked,
        }
    }

    /// OpenStreetMap, Esri satellite imagery and OpenTopoMap terrain
    pub fn defaults() -> Vec<BaseLayer> {
        let osm = "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> \
                   contributors";
        vec![
            BaseLayer::new(
                "OpenStreetMap",
                "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
                osm,
                true,
            ),
            BaseLayer::new(
                "Satellite",
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
                "&copy; <a href=\"https://www.esri.com/\">Esri</a>",
                false,
            ),
            BaseLayer::new(
                "Terrain",
                "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
                osm,
                false,
            ),
        ]
    }
}

/// Candidate site marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkerStyle {
    pub fill_color: String,
    pub size_px: u32,
    pub border_px: u32,
    pub border_color: String,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            fill_color: "#4285f4".to_string(),
            size_px: 12,
            border_px: 3,
            border_color: "white".to_string(),
        }
    }
}

/// Stroke and fill of polygon overlays (hazard areas)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayStyle {
    pub color: String,
    pub weight: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: "#ff7800".to_string(),
            weight: 2.0,
            fill_color: "#ff7800".to_string(),
            fill_opacity: 0.2,
        }
    }
}

/// Presentation section of the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresentationConfig {
    pub title: String,
    pub footer: Option<String>,
    /// Initial view centre as `[lat, lon]`; the scored area's centre when absent
    pub center: Option<[f64; 2]>,
    pub zoom: u8,
    pub base_layers: Vec<BaseLayer>,
    pub marker: MarkerStyle,
    pub hazard_style: OverlayStyle,
    /// Number of candidate sites to rank
    pub candidate_sites: usize,
    /// Minimum distance between two ranked sites
    pub min_separation_km: f64,
    /// Radius drawn around the top-ranked site
    pub highlight_radius_m: Option<f64>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            title: "Data Center Compass".to_string(),
            footer: None,
            center: None,
            zoom: 6,
            base_layers: BaseLayer::defaults(),
            marker: MarkerStyle::default(),
            hazard_style: OverlayStyle::default(),
            candidate_sites: 3,
            min_separation_km: 50.0,
            highlight_radius_m: Some(20_000.0),
        }
    }
}

// ============================================================================
// Payload
// ============================================================================

/// One ranked location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSite {
    /// 1-based
    pub rank: usize,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_radius_m: Option<f64>,
}

/// Immutable payload handed to the map layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPresentation {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    pub center: [f64; 2],
    pub zoom: u8,
    pub base_layers: Vec<BaseLayer>,
    pub marker: MarkerStyle,
    pub hazard_style: OverlayStyle,
    pub heatmap: Vec<HeatmapPoint>,
    pub sites: Vec<CandidateSite>,
}

impl MapPresentation {
    /// Build the payload for a set of scored points
    pub fn build(config: &PresentationConfig, points: &[ScoredPoint]) -> Self {
        let mut sites = rank_sites(points, config.candidate_sites, config.min_separation_km);
        if let Some(top) = sites.first_mut() {
            top.highlight_radius_m = config.highlight_radius_m;
        }

        Self {
            title: config.title.clone(),
            footer: config.footer.clone(),
            center: config.center.unwrap_or_else(|| extent_center(points)),
            zoom: config.zoom,
            base_layers: config.base_layers.clone(),
            marker: config.marker.clone(),
            hazard_style: config.hazard_style.clone(),
            heatmap: heatmap_triples(points),
            sites,
        }
    }
}

/// Midpoint of the points' lat/lon extent, `[0, 0]` when empty
fn extent_center(points: &[ScoredPoint]) -> [f64; 2] {
    let Some(first) = points.first() else {
        return [0.0, 0.0];
    };

    let (mut lat_min, mut lat_max) = (first.lat, first.lat);
    let (mut lon_min, mut lon_max) = (first.lon, first.lon);
    for p in &points[1..] {
        lat_min = lat_min.min(p.lat);
        lat_max = lat_max.max(p.lat);
        lon_min = lon_min.min(p.lon);
        lon_max = lon_max.max(p.lon);
    }

    [(lat_min + lat_max) / 2.0, (lon_min + lon_max) / 2.0]
}

/// Label for a 1-based rank
pub fn rank_label(rank: usize) -> String {
    match rank.checked_sub(1).and_then(|i| RANK_LABELS.get(i)) {
        Some(label) => label.to_string(),
        None => format!("Candidate location {}", rank),
    }
}

/// Pick the top `n` candidate sites
///
/// Algorithm:
/// 1. Drop excluded points
/// 2. Order by final score, highest first; equal scores keep input order
/// 3. Accept a point only if it is at least `min_separation_km` from every
///    site already accepted, until `n` sites are chosen
pub fn rank_sites(points: &[ScoredPoint], n: usize, min_separation_km: f64) -> Vec<CandidateSite> {
    let mut order: Vec<&ScoredPoint> = points.iter().filter(|p| !p.excluded).collect();
    order.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    let min_separation_m = min_separation_km.max(0.0) * 1000.0;
    let mut sites: Vec<CandidateSite> = Vec::with_capacity(n);

    for p in order {
        if sites.len() >= n {
            break;
        }

        let candidate = p.point();
        let too_close = sites
            .iter()
            .any(|s| haversine_m(&candidate, &GridPoint::new(s.lat, s.lon)) < min_separation_m);
        if too_close {
            continue;
        }

        let rank = sites.len() + 1;
        sites.push(CandidateSite {
            rank,
            label: rank_label(rank),
            lat: p.lat,
            lon: p.lon,
            score: p.final_score,
            highlight_radius_m: None,
        });
    }

    sites
}
