//! Polygon geometry for the area of interest and scene footprints.
//!
//! All geometries are expressed in the coordinate system of the analysis grid.
//! Polygons are simple rings without holes, backed by `geo`.

use geo::{Area, BoundingRect, Contains, Intersects, LineString, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

use crate::types::{FloodError, FloodResult, GridSpec, ValidityMask};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

impl From<geo::Rect<f64>> for BoundingBox {
    fn from(rect: geo::Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

/// Validated simple polygon
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    shape: geo::Polygon<f64>,
    bbox: BoundingBox,
}

impl Polygon {
    /// Build a polygon from its ring. An explicit closing vertex is optional.
    pub fn new(vertices: Vec<(f64, f64)>) -> FloodResult<Self> {
        if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(FloodError::Configuration(
                "polygon has non-finite coordinates".to_string(),
            ));
        }
        let mut distinct = vertices.clone();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(FloodError::Configuration(format!(
                "polygon needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        let shape = geo::Polygon::new(LineString::from(vertices), vec![]);
        if shape.unsigned_area() <= 0.0 {
            return Err(FloodError::Configuration(
                "polygon has zero area".to_string(),
            ));
        }
        let bbox = shape.bounding_rect().map(BoundingBox::from).ok_or_else(|| {
            FloodError::Configuration("polygon has no extent".to_string())
        })?;
        Ok(Self { shape, bbox })
    }

    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> FloodResult<Self> {
        Self::new(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
        ])
    }

    /// Ring vertices without the closing vertex
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        let ring = &self.shape.exterior().0;
        ring[..ring.len().saturating_sub(1)]
            .iter()
            .map(|c| (c.x, c.y))
            .collect()
    }

    pub fn as_geo(&self) -> &geo::Polygon<f64> {
        &self.shape
    }

    /// Area in squared map units
    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Strict interior test; points on the boundary are outside
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.bbox.contains_point(x, y) && self.shape.contains(&Point::new(x, y))
    }

    /// True if the two polygons share any area or boundary point
    pub fn intersects(&self, other: &Polygon) -> bool {
        self.bbox.intersects(&other.bbox) && self.shape.intersects(&other.shape)
    }
}

/// Area of interest: one or more polygons. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    polygons: Vec<Polygon>,
    shape: MultiPolygon<f64>,
    bbox: BoundingBox,
}

impl AreaOfInterest {
    pub fn new(polygons: Vec<Polygon>) -> FloodResult<Self> {
        let Some(first) = polygons.first() else {
            return Err(FloodError::Configuration(
                "area of interest has no polygons".to_string(),
            ));
        };
        let bbox = polygons
            .iter()
            .fold(first.bounding_box(), |acc, p| acc.union(&p.bounding_box()));
        let shape = MultiPolygon::new(polygons.iter().map(|p| p.shape.clone()).collect());
        Ok(Self {
            polygons,
            shape,
            bbox,
        })
    }

    pub fn from_polygon(polygon: Polygon) -> Self {
        Self {
            bbox: polygon.bounding_box(),
            shape: MultiPolygon::new(vec![polygon.shape.clone()]),
            polygons: vec![polygon],
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.bbox.contains_point(x, y) && self.shape.contains(&Point::new(x, y))
    }

    pub fn intersects(&self, footprint: &Polygon) -> bool {
        self.bbox.intersects(&footprint.bbox) && self.shape.intersects(footprint.as_geo())
    }

    /// Per-pixel clip mask: true where the pixel centre lies inside the AOI
    pub fn clip_mask(&self, grid: &GridSpec) -> ValidityMask {
        ValidityMask::from_shape_fn(grid.dim(), |(row, col)| {
            let (x, y) = grid.geo_transform.pixel_center(row, col);
            self.contains_point(x, y)
        })
    }
}
