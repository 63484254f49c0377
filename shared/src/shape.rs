use crate::geometry::centroid;
use crate::math::Vec2;

/// Local-space outline of an entity plus its world-space image for the
/// current pose.
///
/// The world cache is only refreshed by [`ShapePolygon::update`]; callers must
/// re-pose after every pose change before reading [`ShapePolygon::world_points`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShapePolygon {
    source: Vec<Vec2>,
    world: Vec<Vec2>,
}

impl ShapePolygon {
    pub fn new(points: Vec<Vec2>) -> Self {
        let world = points.clone();
        Self {
            source: points,
            world,
        }
    }

    /// Axis-aligned rectangle centred on the local origin.
    pub fn rectangle(width: f32, height: f32) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self::new(vec![
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ])
    }

    /// Nose-forward dart along +x, the default aircraft/missile outline.
    pub fn dart(length: f32, span: f32) -> Self {
        let (hl, hs) = (length / 2.0, span / 2.0);
        Self::new(vec![
            Vec2::new(hl, 0.0),
            Vec2::new(-hl, hs),
            Vec2::new(-hl * 0.6, 0.0),
            Vec2::new(-hl, -hs),
        ])
    }

    pub fn local_points(&self) -> &[Vec2] {
        &self.source
    }

    pub fn world_points(&self) -> &[Vec2] {
        &self.world
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Re-poses the world cache: scale, then rotate about the local origin,
    /// then translate. Always recomputed from the source copy.
    pub fn update(&mut self, position: Vec2, rotation: f32, scale: f32) {
        self.world.clear();
        self.world.extend(
            self.source
                .iter()
                .map(|p| transform_point(*p, position, rotation, scale)),
        );
    }

    /// World-space copy of this outline at an arbitrary pose, leaving the
    /// live cache untouched.
    pub fn posed(&self, position: Vec2, rotation: f32, scale: f32) -> Vec<Vec2> {
        self.source
            .iter()
            .map(|p| transform_point(*p, position, rotation, scale))
            .collect()
    }

    /// Mirrors the source outline about its local horizontal axis.
    /// The world cache is stale until the next `update`.
    pub fn flip(&mut self) {
        for point in &mut self.source {
            point.y = -point.y;
        }
    }

    pub fn world_centroid(&self) -> Option<Vec2> {
        centroid(&self.world)
    }

    /// Largest distance from the local origin to any source point.
    pub fn local_radius(&self) -> f32 {
        self.source
            .iter()
            .map(|p| p.length())
            .fold(0.0_f32, f32::max)
    }
}

fn transform_point(point: Vec2, position: Vec2, rotation: f32, scale: f32) -> Vec2 {
    point.scale(scale).rotate(rotation) + position
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_update_scales_rotates_then_translates() {
        let mut shape = ShapePolygon::new(vec![Vec2::new(1.0, 0.0)]);
        shape.update(Vec2::new(10.0, 5.0), PI / 2.0, 2.0);

        let p = shape.world_points()[0];
        assert_approx_eq!(p.x, 10.0, 1e-5);
        assert_approx_eq!(p.y, 7.0, 1e-5);
    }

    #[test]
    fn test_repeated_update_does_not_drift() {
        let mut shape = ShapePolygon::dart(20.0, 12.0);
        shape.update(Vec2::new(3.0, -4.0), 0.7, 1.0);
        let first = shape.world_points().to_vec();
        shape.update(Vec2::new(3.0, -4.0), 0.7, 1.0);
        assert_eq!(shape.world_points(), first.as_slice());
    }

    #[test]
    fn test_world_len_matches_source() {
        let mut shape = ShapePolygon::rectangle(10.0, 10.0);
        shape.update(Vec2::new(100.0, 0.0), 0.0, 1.0);
        assert_eq!(shape.world_points().len(), shape.local_points().len());
        assert_eq!(shape.len(), 4);
    }

    #[test]
    fn test_flip_needs_update_to_show() {
        let mut shape = ShapePolygon::new(vec![Vec2::new(1.0, 2.0)]);
        shape.update(Vec2::ZERO, 0.0, 1.0);
        shape.flip();

        assert_eq!(shape.local_points()[0], Vec2::new(1.0, -2.0));
        assert_eq!(shape.world_points()[0], Vec2::new(1.0, 2.0));

        shape.update(Vec2::ZERO, 0.0, 1.0);
        assert_eq!(shape.world_points()[0], Vec2::new(1.0, -2.0));
    }

    #[test]
    fn test_posed_leaves_cache_alone() {
        let mut shape = ShapePolygon::rectangle(2.0, 2.0);
        shape.update(Vec2::ZERO, 0.0, 1.0);
        let moved = shape.posed(Vec2::new(50.0, 0.0), 0.0, 1.0);

        assert_approx_eq!(moved[0].x, 49.0, 1e-5);
        assert_approx_eq!(shape.world_points()[0].x, -1.0, 1e-5);
        assert_approx_eq!(shape.local_radius(), 2.0_f32.sqrt(), 1e-5);
    }
}
