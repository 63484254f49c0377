//! Client-side mirror of the server world
//!
//! Every networked entity is replayed from server snapshots through its
//! interpolation playback. Debris is the one kind simulated locally.

use log::{debug, info};
use shared::{
    EntityId, EntityKind, EntityUpdate, PlaybackStats, Side, SimConfig, SpawnInfo, SyncError,
    TickReport, Timestamp, World,
};

/// Debris pieces spawned when an aircraft is shot down.
pub const DEBRIS_PIECES: usize = 6;

pub struct MirrorState {
    world: World,
    own_aircraft: Option<EntityId>,
}

impl MirrorState {
    pub fn new(config: SimConfig) -> Result<Self, SyncError> {
        Ok(Self {
            world: World::new(config, Side::Client)?,
            own_aircraft: None,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn own_aircraft(&self) -> Option<EntityId> {
        self.own_aircraft
    }

    pub fn set_own_aircraft(&mut self, id: EntityId) {
        info!("Flying aircraft {}", id);
        self.own_aircraft = Some(id);
    }

    /// Mirrors announced entities. Entities already known are skipped.
    /// Returns the ids that were added.
    pub fn apply_spawns(&mut self, entities: &[SpawnInfo], arrival: Timestamp) -> Vec<EntityId> {
        let mut added = Vec::with_capacity(entities.len());
        for info in entities {
            match self.world.spawn_remote(info, arrival) {
                Ok(()) => added.push(info.id),
                Err(SyncError::DuplicateEntity(id)) => debug!("{} already mirrored", id),
                Err(e) => debug!("Spawn of {} rejected: {}", info.id, e),
            }
        }
        added
    }

    /// Feeds a snapshot batch into the playbacks. Returns how many samples
    /// were accepted; updates for unknown entities are dropped.
    pub fn apply_snapshots(&self, updates: &[EntityUpdate], arrival: Timestamp) -> usize {
        updates
            .iter()
            .filter(|u| {
                self.world
                    .on_remote_update(u.id, u.snapshot, arrival)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Removes a mirrored entity. A destroyed aircraft leaves debris behind.
    pub fn apply_despawn(&mut self, id: EntityId, destroyed: bool) -> Vec<EntityId> {
        let Ok(entity) = self.world.despawn(id) else {
            debug!("Despawn for unknown {}", id);
            return Vec::new();
        };
        if self.own_aircraft == Some(id) {
            self.own_aircraft = None;
        }

        if destroyed && entity.kind() == EntityKind::Aircraft {
            info!("Aircraft {} was shot down", id);
            self.world
                .spawn_debris(entity.position(), entity.velocity(), DEBRIS_PIECES)
        } else {
            Vec::new()
        }
    }

    pub fn step(&mut self, now: Timestamp) -> Result<TickReport, SyncError> {
        self.world.step(now)
    }

    /// Server time currently displayed, for stamping outgoing fire requests.
    pub fn view_timestamp(&self, now: Timestamp) -> Option<Timestamp> {
        let own = self.own_aircraft?;
        self.world.playback(own)?.view_timestamp(now)
    }

    /// Heading of the local pilot's aircraft as last displayed.
    pub fn own_rotation(&self) -> Option<f32> {
        self.world.get(self.own_aircraft?).map(|e| e.rotation())
    }

    pub fn playback_stats(&self) -> Vec<(EntityId, PlaybackStats)> {
        let mut stats: Vec<(EntityId, PlaybackStats)> = self
            .world
            .iter()
            .filter_map(|e| e.playback().map(|p| (e.id(), p.stats())))
            .collect();
        stats.sort_by_key(|(id, _)| *id);
        stats
    }
}
