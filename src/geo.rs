//! Geodesy helpers
//!
//! Great-circle distances on a spherical Earth plus the planar point-in-ring
//! test used by hazard boundaries. Coordinates are decimal degrees.

use crate::grid::GridPoint;

/// Mean Earth radius (IUGG), metres
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two points in metres
pub fn haversine_m(a: &GridPoint, b: &GridPoint) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Distance in metres from `p` to the segment `a`-`b`
///
/// The closest point on the segment is found in an equirectangular projection
/// centred on `p`, then measured with the haversine formula. Segments crossing
/// the antimeridian are not supported.
pub fn distance_to_segment_m(p: &GridPoint, a: &GridPoint, b: &GridPoint) -> f64 {
    let cos_lat = p.lat.to_radians().cos();

    // Degrees -> local planar units (longitude shrunk by cos(lat))
    let ax = (a.lon - p.lon) * cos_lat;
    let ay = a.lat - p.lat;
    let bx = (b.lon - p.lon) * cos_lat;
    let by = b.lat - p.lat;

    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq > 0.0 {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let closest = GridPoint::new(a.lat + t * (b.lat - a.lat), a.lon + t * (b.lon - a.lon));
    haversine_m(p, &closest)
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Smallest box around a set of points; `None` for an empty slice
    pub fn around(points: &[GridPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            lat_min: first.lat,
            lat_max: first.lat,
            lon_min: first.lon,
            lon_max: first.lon,
        };
        for p in &points[1..] {
            bbox.lat_min = bbox.lat_min.min(p.lat);
            bbox.lat_max = bbox.lat_max.max(p.lat);
            bbox.lon_min = bbox.lon_min.min(p.lon);
            bbox.lon_max = bbox.lon_max.max(p.lon);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &GridPoint) -> bool {
        (self.lat_min..=self.lat_max).contains(&p.lat)
            && (self.lon_min..=self.lon_max).contains(&p.lon)
    }
}

/// Even-odd ray casting test against a closed or open ring
pub fn ring_contains(ring: &[GridPoint], p: &GridPoint) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (vi, vj) = (&ring[i], &ring[j]);
        if (vi.lat > p.lat) != (vj.lat > p.lat) {
            let lon_cross = vi.lon + (p.lat - vi.lat) / (vj.lat - vi.lat) * (vj.lon - vi.lon);
            if p.lon < lon_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
