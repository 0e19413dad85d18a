use serde::{Deserialize, Serialize};

/// A 2-D point in frame pixel coordinates.
///
/// Serialized as a two element array `[x, y]`, which is how zone polygons
/// are stored on the camera record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(point: Point) -> Self {
        [point.x, point.y]
    }
}

const EPSILON: f64 = 1e-9;

/// Returns true when `point` lies inside `polygon` or on its boundary.
///
/// The polygon is treated as a closed ring (last point connects back to the
/// first) and may be non-convex. Polygons with fewer than three points never
/// contain anything.
pub fn contains(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let edges = polygon.iter().zip(polygon.iter().cycle().skip(1));

    let mut inside = false;
    for (a, b) in edges {
        if on_segment(point, *a, *b) {
            return true;
        }

        // Even-odd crossing test against a ray cast towards +x
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
    }

    inside
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPSILON {
        return false;
    }

    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}
