//! The single entity representation shared by aircraft, missiles, bullets
//! and debris. Behaviour differences come from the kind's tuning and the
//! capability tags, not from a type hierarchy.

use crate::history::HistoryBuffer;
use crate::math::{normalize_angle, Vec2};
use crate::playback::InterpolationPlayback;
use crate::shape::ShapePolygon;
use crate::snapshot::Snapshot;
use crate::world::TickContext;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Session-unique entity identifier. Never reused, even after the arena
/// slot holding the entity is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Aircraft,
    Missile,
    Bullet,
    Debris,
}

/// Tag set describing which systems act on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const SHAPE: Capabilities = Capabilities(1 << 0);
    /// Can be struck by impactors.
    pub const COLLIDABLE: Capabilities = Capabilities(1 << 1);
    /// Strikes collidable entities.
    pub const IMPACTOR: Capabilities = Capabilities(1 << 2);
    /// Records history so hits against it can be rewound.
    pub const LAG_COMPENSATED: Capabilities = Capabilities(1 << 3);
    pub const GRAVITY: Capabilities = Capabilities(1 << 4);

    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 | other.0)
    }

    pub const fn without(self, other: Capabilities) -> Capabilities {
        Capabilities(self.0 & !other.0)
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        self.union(rhs)
    }
}

/// Gameplay tuning per kind. Runtime timing lives in `SimConfig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindTuning {
    pub capabilities: Capabilities,
    pub hit_points: i32,
    /// Damage dealt to a target when this kind strikes it.
    pub damage: i32,
    /// Seconds until expiry, `None` for unlimited.
    pub lifetime: Option<f32>,
    /// Secondary behaviour (AI, radar) runs every Nth tick.
    pub secondary_interval: u32,
    /// Snapshots go out every Nth tick; `0` never leaves the process.
    pub send_interval: u32,
    pub shape_length: f32,
    pub shape_span: f32,
}

impl EntityKind {
    pub const fn tuning(self) -> KindTuning {
        match self {
            EntityKind::Aircraft => KindTuning {
                capabilities: Capabilities::SHAPE
                    .union(Capabilities::COLLIDABLE)
                    .union(Capabilities::LAG_COMPENSATED),
                hit_points: 100,
                damage: 50,
                lifetime: None,
                secondary_interval: 4,
                send_interval: 1,
                shape_length: 24.0,
                shape_span: 20.0,
            },
            EntityKind::Missile => KindTuning {
                capabilities: Capabilities::SHAPE
                    .union(Capabilities::COLLIDABLE)
                    .union(Capabilities::IMPACTOR)
                    .union(Capabilities::LAG_COMPENSATED),
                hit_points: 10,
                damage: 60,
                lifetime: Some(6.0),
                secondary_interval: 2,
                send_interval: 1,
                shape_length: 8.0,
                shape_span: 3.0,
            },
            EntityKind::Bullet => KindTuning {
                capabilities: Capabilities::SHAPE.union(Capabilities::IMPACTOR),
                hit_points: 1,
                damage: 10,
                lifetime: Some(1.5),
                secondary_interval: 0,
                send_interval: 2,
                shape_length: 2.0,
                shape_span: 1.0,
            },
            EntityKind::Debris => KindTuning {
                capabilities: Capabilities::SHAPE.union(Capabilities::GRAVITY),
                hit_points: 1,
                damage: 0,
                lifetime: Some(3.0),
                secondary_interval: 0,
                send_interval: 0,
                shape_length: 4.0,
                shape_span: 4.0,
            },
        }
    }

    /// Default outline for the kind.
    pub fn default_shape(self) -> ShapePolygon {
        let tuning = self.tuning();
        match self {
            EntityKind::Debris => ShapePolygon::rectangle(tuning.shape_length, tuning.shape_span),
            _ => ShapePolygon::dart(tuning.shape_length, tuning.shape_span),
        }
    }
}

/// Who owns the ground truth for an entity in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Integrated here and broadcast outward.
    Authoritative,
    /// Mirrored from network snapshots through playback.
    Remote,
}

/// Control input from external flight or guidance models. Applied by the
/// integrator; it never writes pose directly.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Steering {
    pub acceleration: Vec2,
    /// Radians per second.
    pub rotation_speed: f32,
}

/// Expiry timer advanced once per sub-step by the integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifetime {
    Unlimited,
    Remaining(f32),
}

impl Lifetime {
    /// Advances the timer and reports whether it just ran out.
    fn advance(&mut self, dt: f32) -> bool {
        match self {
            Lifetime::Unlimited => false,
            Lifetime::Remaining(left) => {
                *left -= dt;
                *left <= 0.0
            }
        }
    }
}

/// Parameters for creating an entity. Pose is only set here, at spawn.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub owner: Option<EntityId>,
    pub scale: f32,
    pub shape: Option<ShapePolygon>,
    /// Sender-clock time the firing side was displaying, for impactors
    /// created from a remote fire command.
    pub origin_timestamp: Option<Timestamp>,
}

impl EntitySpec {
    pub fn new(kind: EntityKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            velocity: Vec2::ZERO,
            rotation: 0.0,
            owner: None,
            scale: 1.0,
            shape: None,
            origin_timestamp: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_owner(mut self, owner: EntityId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_shape(mut self, shape: ShapePolygon) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_origin_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.origin_timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    capabilities: Capabilities,
    authority: Authority,
    position: Vec2,
    velocity: Vec2,
    rotation: f32,
    scale: f32,
    steering: Steering,
    owner: Option<EntityId>,
    expired: bool,
    hit_points: i32,
    lifetime: Lifetime,
    shape: Option<ShapePolygon>,
    history: Option<HistoryBuffer>,
    playback: Option<Arc<InterpolationPlayback>>,
    origin_timestamp: Option<Timestamp>,
    spawned_at: Timestamp,
    decimation_counter: u32,
}

impl Entity {
    /// Builds an entity. Remote entities get a playback buffer; authoritative
    /// lag-compensated ones get a history buffer.
    pub fn new(
        id: EntityId,
        spec: EntitySpec,
        authority: Authority,
        ctx: &TickContext,
    ) -> Self {
        let tuning = spec.kind.tuning();
        let mut capabilities = tuning.capabilities;

        let mut shape = if capabilities.contains(Capabilities::SHAPE) {
            Some(spec.shape.unwrap_or_else(|| spec.kind.default_shape()))
        } else {
            None
        };
        if shape.as_ref().is_some_and(|s| s.is_empty()) {
            shape = None;
            capabilities = capabilities.without(Capabilities::SHAPE);
        }

        let history = (authority == Authority::Authoritative
            && capabilities.contains(Capabilities::LAG_COMPENSATED))
        .then(|| HistoryBuffer::new(ctx.history_retention_ms));

        let playback = (authority == Authority::Remote).then(|| {
            Arc::new(InterpolationPlayback::new(
                ctx.playback_buffer_ms,
                ctx.playback_queue_depth,
            ))
        });

        let mut entity = Self {
            id,
            kind: spec.kind,
            capabilities,
            authority,
            position: spec.position,
            velocity: spec.velocity,
            rotation: normalize_angle(spec.rotation),
            scale: spec.scale,
            steering: Steering::default(),
            owner: spec.owner,
            expired: false,
            hit_points: tuning.hit_points,
            lifetime: tuning
                .lifetime
                .map_or(Lifetime::Unlimited, Lifetime::Remaining),
            shape,
            history,
            playback,
            origin_timestamp: spec.origin_timestamp,
            spawned_at: ctx.now,
            decimation_counter: 0,
        };
        entity.refresh_shape();
        entity
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn is_remote(&self) -> bool {
        self.authority == Authority::Remote
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn hit_points(&self) -> i32 {
        self.hit_points
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn shape(&self) -> Option<&ShapePolygon> {
        self.shape.as_ref()
    }

    pub fn history(&self) -> Option<&HistoryBuffer> {
        self.history.as_ref()
    }

    /// Shared handle for the network receive path.
    pub fn playback(&self) -> Option<&Arc<InterpolationPlayback>> {
        self.playback.as_ref()
    }

    pub fn origin_timestamp(&self) -> Option<Timestamp> {
        self.origin_timestamp
    }

    pub fn spawned_at(&self) -> Timestamp {
        self.spawned_at
    }

    /// Geometric centre used by the sweep test: the shape centroid when the
    /// entity has one, otherwise its position.
    pub fn center(&self) -> Vec2 {
        self.shape
            .as_ref()
            .and_then(|s| s.world_centroid())
            .unwrap_or(self.position)
    }

    /// Radius of the posed outline around `position`.
    pub fn bounding_radius(&self) -> f32 {
        self.shape
            .as_ref()
            .map_or(0.0, |s| s.local_radius() * self.scale.abs())
    }

    pub fn steering(&self) -> Steering {
        self.steering
    }

    /// Stores control input for the next integration.
    pub fn steer(&mut self, steering: Steering) {
        self.steering = steering;
    }

    /// Mirrors the outline left/right. Takes effect at the next re-pose.
    pub fn flip(&mut self) {
        if let Some(shape) = self.shape.as_mut() {
            shape.flip();
        }
    }

    pub fn to_snapshot(&self, timestamp: Timestamp) -> Snapshot {
        Snapshot::new(self.position, self.velocity, self.rotation, timestamp)
    }

    /// Advances an authoritative entity over one tick in `ctx.substeps`
    /// fixed sub-steps. Expired and remote entities are left untouched.
    pub fn integrate(&mut self, ctx: &TickContext) {
        if self.expired || self.is_remote() {
            return;
        }

        let dt = ctx.substep_seconds();
        for _ in 0..ctx.substeps {
            let mut acceleration = self.steering.acceleration;
            if self.has(Capabilities::GRAVITY) {
                acceleration += ctx.gravity;
            }
            self.velocity += acceleration * dt;
            self.position += self.velocity * dt;
            self.rotation = normalize_angle(self.rotation + self.steering.rotation_speed * dt);
            self.clamp_to_bounds(ctx);

            if self.lifetime.advance(dt) {
                self.expired = true;
                break;
            }
        }
    }

    fn clamp_to_bounds(&mut self, ctx: &TickContext) {
        let bounds = &ctx.bounds;
        if self.position.y < bounds.ground_y {
            self.position.y = bounds.ground_y;
            self.velocity.y = self.velocity.y.max(0.0);
        } else if self.position.y > bounds.ceiling_y {
            self.position.y = bounds.ceiling_y;
            self.velocity.y = self.velocity.y.min(0.0);
        }

        if self.position.x < bounds.min_x {
            self.position.x = bounds.min_x;
            self.velocity.x = self.velocity.x.max(0.0);
        } else if self.position.x > bounds.max_x {
            self.position.x = bounds.max_x;
            self.velocity.x = self.velocity.x.min(0.0);
        }
    }

    /// Overwrites a remote entity's pose from its playback at local time
    /// `now`. Returns false when playback has nothing to show yet.
    pub fn apply_playback(&mut self, now: Timestamp) -> bool {
        if self.expired {
            return false;
        }
        let Some(pose) = self
            .playback
            .as_ref()
            .and_then(|p| p.get_interpolated_state(now))
        else {
            return false;
        };
        self.position = pose.position;
        self.velocity = pose.velocity;
        self.rotation = pose.rotation;
        true
    }

    /// Queues a received snapshot for playback. Authoritative entities
    /// ignore remote state and return false.
    pub fn apply_remote_snapshot(&self, snapshot: Snapshot, arrival: Timestamp) -> bool {
        match &self.playback {
            Some(playback) => playback.enqueue(snapshot, arrival),
            None => false,
        }
    }

    /// Recomputes the world-space outline for the finalized pose.
    pub fn refresh_shape(&mut self) {
        if let Some(shape) = self.shape.as_mut() {
            shape.update(self.position, self.rotation, self.scale);
        }
    }

    /// Pushes the current pose into history. No-op for entities without one.
    pub fn record_history(&mut self, timestamp: Timestamp) -> bool {
        let snapshot = self.to_snapshot(timestamp);
        match self.history.as_mut() {
            Some(history) => history.enqueue(snapshot, timestamp),
            None => false,
        }
    }

    /// Outline of this entity posed at a historical snapshot.
    pub fn posed_points(&self, pose: &Snapshot) -> Option<Vec<Vec2>> {
        self.shape
            .as_ref()
            .map(|s| s.posed(pose.position, pose.rotation, self.scale))
    }

    /// Counts ticks for secondary behaviour. True on every Nth call, where N
    /// is the kind's secondary interval; kinds with interval 0 never fire.
    pub fn tick_secondary(&mut self) -> bool {
        let interval = self.kind.tuning().secondary_interval;
        if interval == 0 || self.expired {
            return false;
        }
        self.decimation_counter += 1;
        if self.decimation_counter >= interval {
            self.decimation_counter = 0;
            true
        } else {
            false
        }
    }

    /// Subtracts damage and expires the entity at zero hit points.
    /// Returns true when this hit destroyed it.
    pub fn apply_damage(&mut self, damage: i32) -> bool {
        if self.expired {
            return false;
        }
        self.hit_points = (self.hit_points - damage).max(0);
        if self.hit_points == 0 {
            self.expired = true;
            return true;
        }
        false
    }

    pub fn expire(&mut self) {
        self.expired = true;
    }
}
