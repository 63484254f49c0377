use crate::entity::EntityId;
use crate::Timestamp;
use thiserror::Error;

/// Internal invariant violations of the synchronization core.
///
/// Recoverable conditions (history misses, playback starvation, stale network
/// snapshots, degenerate geometry) never surface here; they are absorbed by
/// their fallbacks. Anything in this enum should halt the simulation loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Configuration rejected by `SimConfig::validate`
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A tick was requested with a timestamp earlier than the previous one
    #[error("simulation clock went backwards: tick at {now}ms after tick at {previous}ms")]
    ClockWentBackwards { previous: Timestamp, now: Timestamp },

    /// Operation referenced an entity the world does not hold
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// A remote spawn reused an id that is already live in this world
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),

    /// Datagram could not be encoded or decoded
    #[error("wire codec failure: {0}")]
    Codec(String),
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Codec(err.to_string())
    }
}
