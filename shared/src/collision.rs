//! Swept polygon hit detection between an impactor and a target.
//!
//! Detection runs after integration, so each impactor point is stretched back
//! along the pair's relative motion over the tick it has just travelled and
//! tested against the target's edges. This catches contacts a pose-only
//! overlap test would tunnel past at high closing speed.

use crate::entity::{Capabilities, Entity};
use crate::geometry::{polygon_edges, Segment};
use crate::math::Vec2;
use crate::snapshot::Snapshot;
use crate::Timestamp;
use log::debug;
use std::cmp::Ordering;

/// Which target pose a test was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseSource {
    /// The target's current, finalized pose.
    Live,
    /// The target's pose rewound from its history.
    Historical(Snapshot),
    /// A rewind was requested but history had no bracketing samples.
    LiveFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResult {
    pub hit: bool,
    pub impact_point: Option<Vec2>,
    pub pose: PoseSource,
}

impl CollisionResult {
    pub fn miss(pose: PoseSource) -> Self {
        Self {
            hit: false,
            impact_point: None,
            pose,
        }
    }

    fn from_impact(impact: Option<Vec2>, pose: PoseSource) -> Self {
        Self {
            hit: impact.is_some(),
            impact_point: impact,
            pose,
        }
    }

    /// The rewound snapshot used for this result, if any.
    pub fn historical_snapshot(&self) -> Option<Snapshot> {
        match self.pose {
            PoseSource::Historical(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollisionDetector {
    broad_phase_distance: f32,
}

impl CollisionDetector {
    pub fn new(broad_phase_distance: f32) -> Self {
        Self {
            broad_phase_distance,
        }
    }

    /// Cheap rejection: capability tags, expiry and self/owner collision.
    pub fn is_candidate(&self, target: &Entity, impactor: &Entity) -> bool {
        target.id() != impactor.id()
            && !target.is_expired()
            && !impactor.is_expired()
            && impactor.owner() != Some(target.id())
            && target.has(Capabilities::COLLIDABLE | Capabilities::SHAPE)
            && impactor.has(Capabilities::IMPACTOR)
    }

    fn within_broad_phase(
        &self,
        target_position: Vec2,
        target_velocity: Vec2,
        target: &Entity,
        impactor: &Entity,
        dt: f32,
    ) -> bool {
        let relative = impactor.velocity() - target_velocity;
        let reach = self.broad_phase_distance
            + target.bounding_radius()
            + impactor.bounding_radius()
            + relative.length() * dt;
        target_position.distance_squared(impactor.position()) <= reach * reach
    }

    /// Tests `impactor` against the target's live pose for the tick `dt`.
    pub fn detect(&self, target: &Entity, impactor: &Entity, dt: f32) -> CollisionResult {
        if !self.is_candidate(target, impactor)
            || !self.within_broad_phase(target.position(), target.velocity(), target, impactor, dt)
        {
            return CollisionResult::miss(PoseSource::Live);
        }

        let Some(shape) = target.shape() else {
            return CollisionResult::miss(PoseSource::Live);
        };
        let impact = sweep(shape.world_points(), target.velocity(), impactor, dt);
        CollisionResult::from_impact(impact, PoseSource::Live)
    }

    /// Tests `impactor` against the target as it stood at `timestamp`.
    ///
    /// Falls back to the live pose when the target's history cannot bracket
    /// `timestamp` (pruned, too young, or no history kept).
    pub fn detect_lag_compensated(
        &self,
        target: &Entity,
        impactor: &Entity,
        dt: f32,
        timestamp: Timestamp,
    ) -> CollisionResult {
        let rewound = target
            .history()
            .and_then(|history| history.get_historical_state(timestamp));

        let Some(pose) = rewound else {
            debug!(
                "no history for {} at {}ms, testing live pose",
                target.id(),
                timestamp
            );
            let live = self.detect(target, impactor, dt);
            return CollisionResult {
                pose: PoseSource::LiveFallback,
                ..live
            };
        };

        let source = PoseSource::Historical(pose);
        if !self.is_candidate(target, impactor)
            || !self.within_broad_phase(pose.position, pose.velocity, target, impactor, dt)
        {
            return CollisionResult::miss(source);
        }

        let Some(points) = target.posed_points(&pose) else {
            return CollisionResult::miss(source);
        };
        let impact = sweep(&points, pose.velocity, impactor, dt);
        CollisionResult::from_impact(impact, source)
    }
}

/// Swept test of the impactor's points and centre against a target outline.
/// Each path covers this tick's relative travel, centred half a tick behind
/// the finalized point. Returns the crossing nearest the impactor's position
/// at the start of the tick.
fn sweep(target_points: &[Vec2], target_velocity: Vec2, impactor: &Entity, dt: f32) -> Option<Vec2> {
    let travel = (impactor.velocity() - target_velocity) * dt;
    let extent = travel * 0.5;
    let origin = impactor.position() - travel;

    let probes = impactor
        .shape()
        .map(|s| s.world_points())
        .unwrap_or(&[])
        .iter()
        .copied()
        .chain(std::iter::once(impactor.center()));

    let mut best: Option<Vec2> = None;
    for probe in probes {
        let path = Segment::centered(probe - extent, extent);
        for edge in polygon_edges(target_points) {
            if let Some(point) = path.intersection(&edge) {
                best = match best {
                    Some(current) if closer(origin, current, point) != Ordering::Greater => {
                        Some(current)
                    }
                    _ => Some(point),
                };
            }
        }
    }
    best
}

/// Orders two candidates by distance to `origin`, then by coordinates so the
/// choice never depends on edge iteration order.
fn closer(origin: Vec2, a: Vec2, b: Vec2) -> Ordering {
    origin
        .distance_squared(a)
        .total_cmp(&origin.distance_squared(b))
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.y.total_cmp(&b.y))
}
