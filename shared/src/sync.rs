//! Authority and pacing rules every entity obeys.
//!
//! The coordinator is policy, not state: it answers which side owns an
//! entity, whether its snapshots leave the process this tick, and whether a
//! hit must be resolved against rewound history.

use crate::entity::{Authority, Capabilities, Entity, EntityKind};
use crate::Timestamp;

/// Which process this simulation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCoordinator {
    side: Side,
    tick_ms: Timestamp,
}

impl SyncCoordinator {
    pub fn new(side: Side, tick_ms: Timestamp) -> Self {
        Self {
            side,
            tick_ms: tick_ms.max(1),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Networked kinds are owned by the server and mirrored on clients.
    /// Kinds that are never sent stay local to whichever side spawns them.
    pub fn authority_for(&self, kind: EntityKind) -> Authority {
        match self.side {
            Side::Server => Authority::Authoritative,
            Side::Client if is_networked(kind) => Authority::Remote,
            Side::Client => Authority::Authoritative,
        }
    }

    /// Whether an authoritative entity's snapshot goes out on `tick`.
    pub fn should_send(&self, entity: &Entity, tick: u64) -> bool {
        if entity.is_remote() || entity.is_expired() {
            return false;
        }
        let interval = entity.kind().tuning().send_interval;
        interval != 0 && tick % interval as u64 == 0
    }

    /// Whether the entity records history for rewinding.
    pub fn records_history(&self, entity: &Entity) -> bool {
        !entity.is_remote() && entity.has(Capabilities::LAG_COMPENSATED)
    }

    /// Timestamp to rewind targets to when resolving `impactor` at `now`.
    ///
    /// Impactors created from a remote fire command carry the sender-clock
    /// time the shooter was viewing. The rewind point follows the
    /// impactor's flight: view time plus the time it has been alive. Returns
    /// `None` when the lag is within one tick and the live pose is fair.
    pub fn rewind_timestamp(&self, impactor: &Entity, now: Timestamp) -> Option<Timestamp> {
        if self.side != Side::Server {
            return None;
        }
        let origin = impactor.origin_timestamp()?;
        let lag = impactor.spawned_at().saturating_sub(origin);
        if lag <= self.tick_ms {
            return None;
        }
        Some(now.saturating_sub(lag))
    }

    /// Whether an attack claim with `impact_timestamp` needs a rewind at `now`.
    pub fn needs_rewind(&self, impact_timestamp: Timestamp, now: Timestamp) -> bool {
        now.saturating_sub(impact_timestamp) > self.tick_ms
    }
}

pub fn is_networked(kind: EntityKind) -> bool {
    kind.tuning().send_interval != 0
}
