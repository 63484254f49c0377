use crate::math::{lerp_angle, normalize_angle, Vec2};
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// One timestamped pose record of a single entity.
///
/// Snapshots are plain values: buffers store copies, so mutating the live
/// entity afterwards never rewrites recorded history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Heading in radians, normalized to `(-PI, PI]`.
    pub rotation: f32,
    /// Simulation time of the authoritative side, in milliseconds.
    pub timestamp: Timestamp,
}

impl Snapshot {
    pub fn new(position: Vec2, velocity: Vec2, rotation: f32, timestamp: Timestamp) -> Self {
        Self {
            position,
            velocity,
            rotation: normalize_angle(rotation),
            timestamp,
        }
    }

    /// Blends toward `to` by `t` in `[0, 1]`.
    ///
    /// Position and velocity blend linearly, rotation along the shortest arc.
    /// The result carries `timestamp` so callers can stamp the exact query time.
    pub fn blend(&self, to: &Snapshot, t: f32, timestamp: Timestamp) -> Snapshot {
        let t = t.clamp(0.0, 1.0);
        Snapshot {
            position: self.position.lerp(to.position, t),
            velocity: self.velocity.lerp(to.velocity, t),
            rotation: lerp_angle(self.rotation, to.rotation, t),
            timestamp,
        }
    }

    /// Fraction of the way `timestamp` lies between `self` and `to`.
    pub fn fraction_towards(&self, to: &Snapshot, timestamp: Timestamp) -> f32 {
        if to.timestamp <= self.timestamp {
            return 1.0;
        }
        let span = (to.timestamp - self.timestamp) as f64;
        let elapsed = timestamp.saturating_sub(self.timestamp) as f64;
        (elapsed / span).clamp(0.0, 1.0) as f32
    }
}
