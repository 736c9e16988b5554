//! Exclusion Masks - binary hazard tests
//!
//! A point inside any hazard boundary (flood overlay, bushfire boundary) is
//! excluded and scores zero no matter how good its factors are. Masks are
//! evaluated independently of factor scoring.

use crate::geo::{ring_contains, BoundingBox};
use crate::grid::GridPoint;

/// Test whether a point falls inside a hazard boundary
pub trait ExclusionMask: Send + Sync {
    fn id(&self) -> &str;

    fn contains(&self, point: &GridPoint) -> bool;
}

/// Polygon with an exterior ring and optional holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Vec<GridPoint>,
    holes: Vec<Vec<GridPoint>>,
    bbox: Option<BoundingBox>,
}

impl Polygon {
    pub fn new(exterior: Vec<GridPoint>, holes: Vec<Vec<GridPoint>>) -> Self {
        let bbox = BoundingBox::around(&exterior);
        Self { exterior, holes, bbox }
    }

    pub fn contains(&self, p: &GridPoint) -> bool {
        match self.bbox {
            Some(bbox) if bbox.contains(p) => {
                ring_contains(&self.exterior, p) && !self.holes.iter().any(|h| ring_contains(h, p))
            }
            _ => false,
        }
    }
}

/// Named hazard area made of one or more polygons
#[derive(Debug, Clone, PartialEq)]
pub struct HazardBoundary {
    id: String,
    polygons: Vec<Polygon>,
}

impl HazardBoundary {
    pub fn new(id: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self {
            id: id.into(),
            polygons,
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }
}

impl ExclusionMask for HazardBoundary {
    fn id(&self) -> &str {
        &self.id
    }

    fn contains(&self, point: &GridPoint) -> bool {
        self.polygons.iter().any(|poly| poly.contains(point))
    }
}

/// True if `point` is inside ANY mask
pub fn is_excluded<M>(point: &GridPoint, masks: &[M]) -> bool
where
    M: AsRef<dyn ExclusionMask>,
{
    masks.iter().any(|m| m.as_ref().contains(point))
}

/// Ids of every mask containing `point` (diagnostics)
pub fn matching_masks<'a, M>(point: &GridPoint, masks: &'a [M]) -> Vec<&'a str>
where
    M: AsRef<dyn ExclusionMask>,
{
    masks
        .iter()
        .map(|m| m.as_ref())
        .filter(|m| m.contains(point))
        .map(|m| m.id())
        .collect()
}
