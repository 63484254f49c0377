//! State synchronization and swept collision core for a networked
//! flight-combat simulation.
//!
//! The server integrates entities at a fixed tick, records their history and
//! resolves hits against rewound poses; clients mirror the same entities
//! through interpolation playback. Both sides drive a [`World`].

pub mod arena;
pub mod collision;
pub mod config;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod history;
pub mod math;
pub mod playback;
pub mod shape;
pub mod snapshot;
pub mod sync;
pub mod world;

pub use collision::{CollisionDetector, CollisionResult, PoseSource};
pub use config::{SimConfig, WorldBounds};
pub use entity::{
    Authority, Capabilities, Entity, EntityId, EntityKind, EntitySpec, KindTuning, Lifetime,
    Steering,
};
pub use error::SyncError;
pub use history::HistoryBuffer;
pub use math::Vec2;
pub use playback::{InterpolationPlayback, PlaybackState, PlaybackStats};
pub use shape::ShapePolygon;
pub use snapshot::Snapshot;
pub use sync::{Side, SyncCoordinator};
pub use world::{HitEvent, Removal, RemovalReason, TickContext, TickReport, World};

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Milliseconds on a process-local simulation clock.
pub type Timestamp = u64;

pub const PROTOCOL_VERSION: u32 = 1;
/// Receive buffer size for one datagram.
pub const MAX_PACKET_SIZE: usize = 8192;
/// Snapshot batches are split so a datagram stays well under `MAX_PACKET_SIZE`.
pub const MAX_UPDATES_PER_PACKET: usize = 128;

/// One entity's pose in a snapshot batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub id: EntityId,
    pub snapshot: Snapshot,
}

/// Announcement of a networked entity to the other side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: Option<EntityId>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    /// Steering for the sender's aircraft, held until the next one.
    Control {
        acceleration: Vec2,
        rotation_speed: f32,
    },
    /// Request to launch an impactor from the sender's aircraft.
    /// `view_timestamp` is the server time the sender was displaying.
    Fire {
        kind: EntityKind,
        view_timestamp: Option<Timestamp>,
    },
    /// Claim that `impactor` struck `target` at server time `impact_timestamp`.
    Attack {
        impactor: EntityId,
        target: EntityId,
        impact_timestamp: Timestamp,
    },
    Disconnect,

    Connected {
        client_id: u32,
        entity_id: EntityId,
        tick_rate: u32,
    },
    Spawn {
        entities: Vec<SpawnInfo>,
    },
    Snapshots {
        tick: u64,
        timestamp: Timestamp,
        updates: Vec<EntityUpdate>,
    },
    Despawn {
        entity_id: EntityId,
        destroyed: bool,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, SyncError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Monotonic millisecond clock starting at zero when created.
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    epoch: Instant,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.epoch.elapsed().as_millis() as Timestamp
    }
}
