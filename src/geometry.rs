//! Geometry kernel: points, bounding boxes, and polygon queries.
//!
//! Every function here is pure. Shape-dependent queries treat inputs with
//! fewer than three vertices as "no area": containment is `false` and the
//! box/centroid helpers return `None` only for empty input.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

/// A point in logical, device, or client space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Ray-casting containment test. Points exactly on an edge may land either way.
#[must_use]
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for (i, a) in polygon.iter().enumerate() {
        let b = polygon[j];
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Bounding box of all vertices, or `None` for an empty slice.
#[must_use]
pub fn bounding_box(polygon: &[Point]) -> Option<BoundingBox> {
    let first = polygon.first()?;
    let init = BoundingBox { min_x: first.x, min_y: first.y, max_x: first.x, max_y: first.y };
    Some(polygon.iter().skip(1).fold(init, |b, p| BoundingBox {
        min_x: b.min_x.min(p.x),
        min_y: b.min_y.min(p.y),
        max_x: b.max_x.max(p.x),
        max_y: b.max_y.max(p.y),
    }))
}

/// Signed shoelace sum; positive for counter-clockwise winding in a y-up frame.
fn signed_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Absolute enclosed area.
#[must_use]
pub fn polygon_area(polygon: &[Point]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    signed_area(polygon).abs()
}

/// Area-weighted centroid. Falls back to the vertex mean when the area is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn centroid(polygon: &[Point]) -> Option<Point> {
    if polygon.is_empty() {
        return None;
    }
    let area = if polygon.len() >= 3 { signed_area(polygon) } else { 0.0 };
    if area.abs() < f64::EPSILON {
        let n = polygon.len() as f64;
        let (sx, sy) = polygon.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Some(Point::new(sx / n, sy / n));
    }
    let n = polygon.len();
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let cross = a.x * b.y - b.x * a.y;
        cx += (a.x + b.x) * cross;
        cy += (a.y + b.y) * cross;
    }
    let k = 1.0 / (6.0 * area);
    Some(Point::new(cx * k, cy * k))
}

/// True when the bounding box is narrower or shorter than `min_extent`.
#[must_use]
pub fn is_degenerate(polygon: &[Point], min_extent: f64) -> bool {
    bounding_box(polygon).is_none_or(|b| b.width() < min_extent || b.height() < min_extent)
}

/// Device (on-canvas) pixels to logical pixels.
#[must_use]
pub fn to_logical(device: Point, scale: f64) -> Point {
    Point::new(device.x / scale, device.y / scale)
}

/// Logical pixels to device (on-canvas) pixels.
#[must_use]
pub fn to_device(logical: Point, scale: f64) -> Point {
    Point::new(logical.x * scale, logical.y * scale)
}

/// Outline of a region.
///
/// Older configurations stored axis-aligned rectangles as `{x, y, width,
/// height}`; current ones store an ordered `points` list. Both forms are
/// accepted on input and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Shape {
    /// Ordered vertices; insertion order is edge order.
    Polygon { points: Vec<Point> },
    /// Legacy axis-aligned rectangle.
    Rect { x: f64, y: f64, width: f64, height: f64 },
}

impl Shape {
    #[must_use]
    pub fn polygon(points: Vec<Point>) -> Self {
        Self::Polygon { points }
    }

    /// Vertices in draw order. A rectangle yields its four corners clockwise from top-left.
    #[must_use]
    pub fn vertices(&self) -> Vec<Point> {
        match self {
            Self::Polygon { points } => points.clone(),
            Self::Rect { x, y, width, height } => vec![
                Point::new(*x, *y),
                Point::new(x + width, *y),
                Point::new(x + width, y + height),
                Point::new(*x, y + height),
            ],
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Polygon { points } => points.len(),
            Self::Rect { .. } => 4,
        }
    }

    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Self::Polygon { points } => bounding_box(points),
            Self::Rect { x, y, width, height } => Some(BoundingBox {
                min_x: x.min(x + width),
                min_y: y.min(y + height),
                max_x: x.max(x + width),
                max_y: y.max(y + height),
            }),
        }
    }

    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        match self {
            Self::Polygon { points } => point_in_polygon(point, points),
            Self::Rect { .. } => self.bounding_box().is_some_and(|b| {
                point.x >= b.min_x && point.x <= b.max_x && point.y >= b.min_y && point.y <= b.max_y
            }),
        }
    }

    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        match self {
            Self::Polygon { points } => centroid(points),
            Self::Rect { x, y, width, height } => Some(Point::new(x + width / 2.0, y + height / 2.0)),
        }
    }

    #[must_use]
    pub fn is_degenerate(&self, min_extent: f64) -> bool {
        self.bounding_box()
            .is_none_or(|b| b.width() < min_extent || b.height() < min_extent)
    }
}
