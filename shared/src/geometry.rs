//! Segment primitives for the swept collision test.

use crate::math::Vec2;

/// Denominators smaller than this are treated as parallel or collinear.
pub const PARALLEL_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
}

impl Segment {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        Self { start, end }
    }

    /// Segment of total length `|extent| * 2` centred on `center`.
    pub fn centered(center: Vec2, extent: Vec2) -> Self {
        Self {
            start: center - extent,
            end: center + extent,
        }
    }

    pub fn direction(&self) -> Vec2 {
        self.end - self.start
    }

    /// Proper intersection point of two segments.
    ///
    /// Parallel and collinear pairs (including grazing overlap) report `None`.
    pub fn intersection(&self, other: &Segment) -> Option<Vec2> {
        let r = self.direction();
        let s = other.direction();
        let denom = r.cross(s);

        // Scale the tolerance with the segment lengths so long sweeps and
        // short edges are judged alike.
        let scale = (r.length() * s.length()).max(1.0);
        if denom.abs() <= PARALLEL_EPSILON * scale {
            return None;
        }

        let qp = other.start - self.start;
        let t = qp.cross(s) / denom;
        let u = qp.cross(r) / denom;

        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some(self.start + r * t)
        } else {
            None
        }
    }
}

/// Closed polygon edges from an ordered point ring.
pub fn polygon_edges(points: &[Vec2]) -> impl Iterator<Item = Segment> + '_ {
    let count = if points.len() >= 2 { points.len() } else { 0 };
    (0..count).map(move |i| Segment::new(points[i], points[(i + 1) % points.len()]))
}

/// Arithmetic mean of the points, or `None` for an empty slice.
pub fn centroid(points: &[Vec2]) -> Option<Vec2> {
    if points.is_empty() {
        return None;
    }
    let sum = points.iter().fold(Vec2::ZERO, |acc, p| acc + *p);
    Some(sum * (1.0 / points.len() as f32))
}

/// Even-odd point containment.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    for edge in polygon_edges(polygon) {
        let (a, b) = (edge.start, edge.end);
        if (a.y > point.y) != (b.y > point.y) {
            let x_at = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < x_at {
                inside = !inside;
            }
        }
    }
    inside
}
