//! Per-tick simulation driver.
//!
//! A `World` owns every entity of one process and advances them in fixed
//! phases: pose, history, collision, apply, removal. Integration and the
//! collision pass run on the rayon pool; every write that crosses entities is
//! applied serially afterwards.

use crate::arena::{Arena, SlotHandle};
use crate::collision::{CollisionDetector, CollisionResult, PoseSource};
use crate::config::{SimConfig, WorldBounds};
use crate::entity::{Authority, Capabilities, Entity, EntityId, EntityKind, EntitySpec, Steering};
use crate::error::SyncError;
use crate::math::Vec2;
use crate::playback::InterpolationPlayback;
use crate::snapshot::Snapshot;
use crate::sync::{is_networked, Side, SyncCoordinator};
use crate::{EntityUpdate, SpawnInfo, Timestamp};
use log::{debug, info, trace};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Ids allocated by a client for its own local entities start here so they
/// never collide with ids assigned by the server.
const CLIENT_LOCAL_ID_BASE: u32 = 1 << 31;

/// Immutable view of the simulation settings for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickContext {
    pub tick: u64,
    pub now: Timestamp,
    /// Seconds covered by the whole tick.
    pub dt: f32,
    pub substeps: u32,
    pub gravity: Vec2,
    pub bounds: WorldBounds,
    pub broad_phase_distance: f32,
    pub history_retention_ms: Timestamp,
    pub playback_buffer_ms: Timestamp,
    pub playback_queue_depth: usize,
}

impl TickContext {
    pub fn new(config: &SimConfig, tick: u64, now: Timestamp) -> Self {
        Self {
            tick,
            now,
            dt: config.tick_seconds(),
            substeps: config.substeps.max(1),
            gravity: config.gravity,
            bounds: config.bounds,
            broad_phase_distance: config.broad_phase_distance,
            history_retention_ms: config.history_retention_ms,
            playback_buffer_ms: config.playback_buffer_ms,
            playback_queue_depth: config.playback_queue_depth,
        }
    }

    pub fn substep_seconds(&self) -> f32 {
        self.dt / self.substeps as f32
    }
}

/// A resolved strike of an impactor against a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitEvent {
    pub impactor: EntityId,
    pub target: EntityId,
    /// Owner of the impactor, credited with the hit.
    pub attacker: Option<EntityId>,
    pub impact_point: Vec2,
    pub pose: PoseSource,
    /// The target's hit points reached zero from this hit.
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Lifetime ran out or the entity was consumed by its own hit.
    Expired,
    /// Hit points reached zero.
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Removal {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub reason: RemovalReason,
}

/// Everything observable that happened during one `World::step`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: Timestamp,
    pub hits: Vec<HitEvent>,
    pub removed: Vec<Removal>,
    /// Entities whose decimated secondary behaviour is due this tick.
    pub secondary_due: Vec<EntityId>,
}

#[derive(Debug)]
pub struct World {
    config: SimConfig,
    coordinator: SyncCoordinator,
    detector: CollisionDetector,
    entities: Arena<Entity>,
    handles: HashMap<EntityId, SlotHandle>,
    next_id: u32,
    tick: u64,
    now: Timestamp,
    stepped: bool,
}

impl World {
    pub fn new(config: SimConfig, side: Side) -> Result<Self, SyncError> {
        config.validate()?;
        let coordinator = SyncCoordinator::new(side, config.tick_millis());
        let detector = CollisionDetector::new(config.broad_phase_distance);
        let next_id = match side {
            Side::Server => 1,
            Side::Client => CLIENT_LOCAL_ID_BASE,
        };

        Ok(Self {
            config,
            coordinator,
            detector,
            entities: Arena::new(),
            handles: HashMap::new(),
            next_id,
            tick: 0,
            now: 0,
            stepped: false,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn side(&self) -> Side {
        self.coordinator.side()
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Timestamp of the most recent step.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn context(&self) -> TickContext {
        TickContext::new(&self.config, self.tick, self.now)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.handles.get(&id).and_then(|&h| self.entities.get(h))
    }

    fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let handle = *self.handles.get(&id)?;
        self.entities.get_mut(handle)
    }

    fn entity(&self, id: EntityId) -> Result<&Entity, SyncError> {
        self.get(id).ok_or(SyncError::EntityNotFound(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.iter()
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        let handle = self.entities.insert(entity);
        self.handles.insert(id, handle);
        id
    }

    /// Creates a locally simulated entity and returns its fresh id.
    pub fn spawn(&mut self, spec: EntitySpec) -> EntityId {
        let id = self.allocate_id();
        let ctx = self.context();
        debug!("spawning {:?} {} at {:?}", spec.kind, id, spec.position);
        self.insert(Entity::new(id, spec, Authority::Authoritative, &ctx))
    }

    /// Creates an entity announced by the other side under the sender's id.
    /// Networked kinds become remote mirrors seeded with the announced pose.
    pub fn spawn_remote(&mut self, info: &SpawnInfo, arrival: Timestamp) -> Result<(), SyncError> {
        if self.contains(info.id) {
            return Err(SyncError::DuplicateEntity(info.id));
        }

        let authority = self.coordinator.authority_for(info.kind);
        let mut spec = EntitySpec::new(info.kind, info.snapshot.position)
            .with_velocity(info.snapshot.velocity)
            .with_rotation(info.snapshot.rotation);
        if let Some(owner) = info.owner {
            spec = spec.with_owner(owner);
        }

        let ctx = self.context();
        let entity = Entity::new(info.id, spec, authority, &ctx);
        entity.apply_remote_snapshot(info.snapshot, arrival);
        debug!("mirroring {:?} {} ({:?})", info.kind, info.id, authority);
        self.insert(entity);
        Ok(())
    }

    /// Scatters short-lived local debris from a point.
    pub fn spawn_debris(&mut self, at: Vec2, velocity: Vec2, count: usize) -> Vec<EntityId> {
        let spread = std::f32::consts::TAU / count.max(1) as f32;
        (0..count)
            .map(|i| {
                let burst = Vec2::new(60.0, 0.0).rotate(spread * i as f32);
                self.spawn(
                    EntitySpec::new(EntityKind::Debris, at)
                        .with_velocity(velocity * 0.5 + burst)
                        .with_rotation(spread * i as f32),
                )
            })
            .collect()
    }

    /// Removes an entity immediately, outside the tick phases.
    pub fn despawn(&mut self, id: EntityId) -> Result<Entity, SyncError> {
        let handle = self
            .handles
            .remove(&id)
            .ok_or(SyncError::EntityNotFound(id))?;
        self.entities
            .remove(handle)
            .ok_or(SyncError::EntityNotFound(id))
    }

    pub fn steer(&mut self, id: EntityId, steering: Steering) -> Result<(), SyncError> {
        let entity = self.get_mut(id).ok_or(SyncError::EntityNotFound(id))?;
        entity.steer(steering);
        Ok(())
    }

    pub fn flip(&mut self, id: EntityId) -> Result<(), SyncError> {
        let entity = self.get_mut(id).ok_or(SyncError::EntityNotFound(id))?;
        entity.flip();
        Ok(())
    }

    /// Routes a received snapshot into the entity's playback buffer.
    /// Returns false when the buffer discarded it or the entity is local.
    pub fn on_remote_update(
        &self,
        id: EntityId,
        snapshot: Snapshot,
        arrival: Timestamp,
    ) -> Result<bool, SyncError> {
        Ok(self.entity(id)?.apply_remote_snapshot(snapshot, arrival))
    }

    /// Shared playback handle for a receive task running beside the loop.
    pub fn playback(&self, id: EntityId) -> Option<Arc<InterpolationPlayback>> {
        self.get(id).and_then(|e| e.playback().cloned())
    }

    /// Resolves an attack claimed by the other side: `attacker` is the
    /// impactor that struck `target` at sender time `impact_timestamp`.
    ///
    /// Targets this side does not own are ignored. Claims older than one
    /// tick are checked against the target's rewound pose.
    pub fn on_remote_attack(
        &mut self,
        attacker: EntityId,
        target: EntityId,
        impact_timestamp: Timestamp,
    ) -> Result<Option<HitEvent>, SyncError> {
        let dt = self.config.tick_seconds();
        let impactor = self.entity(attacker)?;
        let struck = self.entity(target)?;

        if struck.is_remote() {
            debug!("attack on {} ignored, not authoritative here", target);
            return Ok(None);
        }

        let result = if self.coordinator.needs_rewind(impact_timestamp, self.now) {
            self.detector
                .detect_lag_compensated(struck, impactor, dt, impact_timestamp)
        } else {
            self.detector.detect(struck, impactor, dt)
        };

        let Some(hit) = hit_event(impactor, struck, result) else {
            debug!(
                "attack claim {} -> {} at {}ms rejected",
                attacker, target, impact_timestamp
            );
            return Ok(None);
        };
        Ok(self.apply_hit(hit))
    }

    /// Current snapshot of one entity stamped with the last step time.
    pub fn collect_snapshot(&self, id: EntityId) -> Result<Snapshot, SyncError> {
        Ok(self.entity(id)?.to_snapshot(self.now))
    }

    /// Snapshots due for broadcast this tick, ordered by id.
    pub fn collect_outgoing(&self) -> Vec<EntityUpdate> {
        let mut updates: Vec<EntityUpdate> = self
            .entities
            .iter()
            .filter(|e| self.coordinator.should_send(e, self.tick))
            .map(|e| EntityUpdate {
                id: e.id(),
                snapshot: e.to_snapshot(self.now),
            })
            .collect();
        updates.sort_by_key(|u| u.id);
        updates
    }

    pub fn spawn_info(&self, id: EntityId) -> Option<SpawnInfo> {
        self.get(id).map(|e| SpawnInfo {
            id: e.id(),
            kind: e.kind(),
            owner: e.owner(),
            snapshot: e.to_snapshot(self.now),
        })
    }

    /// Spawn announcements for every live networked entity.
    pub fn networked_entities(&self) -> Vec<SpawnInfo> {
        let mut infos: Vec<SpawnInfo> = self
            .entities
            .iter()
            .filter(|e| !e.is_remote() && !e.is_expired() && is_networked(e.kind()))
            .filter_map(|e| self.spawn_info(e.id()))
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Advances the world to `now`.
    pub fn step(&mut self, now: Timestamp) -> Result<TickReport, SyncError> {
        if self.stepped && now < self.now {
            return Err(SyncError::ClockWentBackwards {
                previous: self.now,
                now,
            });
        }
        self.stepped = true;
        self.tick += 1;
        self.now = now;
        let ctx = self.context();

        self.entities.values_mut().into_par_iter().for_each(|entity| {
            if entity.is_remote() {
                entity.apply_playback(ctx.now);
            } else {
                entity.integrate(&ctx);
            }
            entity.refresh_shape();
        });

        let coordinator = self.coordinator;
        for entity in self.entities.iter_mut() {
            if !entity.is_expired() && coordinator.records_history(entity) {
                entity.record_history(ctx.now);
            }
        }

        let mut hits = self.detect_hits(&ctx);
        hits.sort_by_key(|hit| hit.impactor);
        let hits: Vec<HitEvent> = hits
            .into_iter()
            .filter_map(|hit| self.apply_hit(hit))
            .collect();

        let removed = self.remove_expired();

        let mut secondary_due: Vec<EntityId> = self
            .entities
            .iter_mut()
            .filter_map(|e| e.tick_secondary().then(|| e.id()))
            .collect();
        secondary_due.sort();

        trace!(
            "tick {} at {}ms: {} entities, {} hits, {} removed",
            ctx.tick,
            ctx.now,
            self.entities.len(),
            hits.len(),
            removed.len()
        );

        Ok(TickReport {
            tick: ctx.tick,
            timestamp: ctx.now,
            hits,
            removed,
            secondary_due,
        })
    }

    /// Read-only pass over impactor/target pairs. Only targets simulated on
    /// this side are resolved here.
    fn detect_hits(&self, ctx: &TickContext) -> Vec<HitEvent> {
        let targets: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| !e.is_remote() && !e.is_expired() && e.has(Capabilities::COLLIDABLE))
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let impactors: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| !e.is_expired() && e.has(Capabilities::IMPACTOR))
            .collect();

        let coordinator = self.coordinator;
        let detector = self.detector;
        impactors
            .par_iter()
            .filter_map(|impactor| nearest_hit(&detector, &coordinator, impactor, &targets, ctx))
            .collect()
    }

    /// Applies one detected hit. Hits found in the read-only pass are
    /// dropped once an earlier hit this tick has expired either party.
    fn apply_hit(&mut self, mut hit: HitEvent) -> Option<HitEvent> {
        let live = |id| self.get(id).is_some_and(|e: &Entity| !e.is_expired());
        if !live(hit.impactor) || !live(hit.target) {
            debug!(
                "{} -> {} dropped, expired earlier this tick",
                hit.impactor, hit.target
            );
            return None;
        }

        let impactor = self.get_mut(hit.impactor)?;
        impactor.expire();
        let damage = impactor.kind().tuning().damage;
        hit.destroyed = self.get_mut(hit.target)?.apply_damage(damage);

        info!(
            "{} hit {} at ({:.1}, {:.1}){}",
            hit.impactor,
            hit.target,
            hit.impact_point.x,
            hit.impact_point.y,
            if hit.destroyed { ", destroyed" } else { "" }
        );
        Some(hit)
    }

    fn remove_expired(&mut self) -> Vec<Removal> {
        let mut expired: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|e| e.is_expired())
            .map(|e| e.id())
            .collect();
        expired.sort();

        expired
            .into_iter()
            .filter_map(|id| self.despawn(id).ok())
            .map(|entity| Removal {
                id: entity.id(),
                kind: entity.kind(),
                position: entity.position(),
                velocity: entity.velocity(),
                reason: if entity.hit_points() == 0 {
                    RemovalReason::Destroyed
                } else {
                    RemovalReason::Expired
                },
            })
            .collect()
    }
}

fn hit_event(impactor: &Entity, target: &Entity, result: CollisionResult) -> Option<HitEvent> {
    let impact_point = result.impact_point.filter(|_| result.hit)?;
    Some(HitEvent {
        impactor: impactor.id(),
        target: target.id(),
        attacker: impactor.owner(),
        impact_point,
        pose: result.pose,
        destroyed: false,
    })
}

/// The single hit an impactor reports this tick: the one nearest where it
/// started the tick, ties broken by target id.
fn nearest_hit(
    detector: &CollisionDetector,
    coordinator: &SyncCoordinator,
    impactor: &Entity,
    targets: &[&Entity],
    ctx: &TickContext,
) -> Option<HitEvent> {
    let rewind = coordinator.rewind_timestamp(impactor, ctx.now);
    let origin = impactor.position() - impactor.velocity() * ctx.dt;

    targets
        .iter()
        .filter(|target| detector.is_candidate(target, impactor))
        .filter_map(|target| {
            let result = match rewind {
                Some(timestamp) => {
                    detector.detect_lag_compensated(target, impactor, ctx.dt, timestamp)
                }
                None => detector.detect(target, impactor, ctx.dt),
            };
            hit_event(impactor, target, result)
        })
        .min_by(|a, b| {
            origin
                .distance_squared(a.impact_point)
                .total_cmp(&origin.distance_squared(b.impact_point))
                .then_with(|| a.target.cmp(&b.target))
        })
}
