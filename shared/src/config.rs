//! Runtime tunables for the simulation loop and the two network buffers.
//!
//! Gameplay tuning per entity kind lives in `entity::KindTuning`; this module
//! only covers timing, buffering and broad-phase settings.

use crate::error::SyncError;
use crate::math::Vec2;
use crate::Timestamp;
use std::time::Duration;

pub const DEFAULT_TICK_RATE: u32 = 60;
pub const DEFAULT_SUBSTEPS: u32 = 1;
pub const DEFAULT_HISTORY_RETENTION_MS: Timestamp = 1000;
/// Playback lag behind the newest snapshot. Sized to the slowest snapshot
/// stream (bullets, every second tick) so a "to" sample survives one lost
/// or late batch: three 32ms intervals at 60Hz, rounded up.
pub const DEFAULT_PLAYBACK_BUFFER_MS: Timestamp = 100;
pub const DEFAULT_BROAD_PHASE_DISTANCE: f32 = 400.0;
pub const DEFAULT_PLAYBACK_QUEUE_DEPTH: usize = 32;

/// Axis-aligned playfield limits used for ground and edge clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    /// Ground height; nothing integrates below it.
    pub ground_y: f32,
    pub ceiling_y: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min_x: -4000.0,
            max_x: 4000.0,
            ground_y: 0.0,
            ceiling_y: 3000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Fixed duration of one physics tick.
    pub tick_duration: Duration,
    /// Integration sub-steps per tick.
    pub substeps: u32,
    /// How long authoritative history is kept for rewinding. Must cover the
    /// worst round-trip latency the server is willing to compensate.
    pub history_retention_ms: Timestamp,
    /// How far playback runs behind the freshest received snapshot.
    pub playback_buffer_ms: Timestamp,
    /// Queue depth after which playback discards stale samples.
    pub playback_queue_depth: usize,
    /// Coarse distance bound before the swept test runs.
    pub broad_phase_distance: f32,
    pub gravity: Vec2,
    pub bounds: WorldBounds,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / DEFAULT_TICK_RATE as f64),
            substeps: DEFAULT_SUBSTEPS,
            history_retention_ms: DEFAULT_HISTORY_RETENTION_MS,
            playback_buffer_ms: DEFAULT_PLAYBACK_BUFFER_MS,
            playback_queue_depth: DEFAULT_PLAYBACK_QUEUE_DEPTH,
            broad_phase_distance: DEFAULT_BROAD_PHASE_DISTANCE,
            gravity: Vec2::new(0.0, -98.0),
            bounds: WorldBounds::default(),
        }
    }
}

impl SimConfig {
    /// Builds a config for the given tick rate, keeping every other default.
    pub fn with_tick_rate(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
            ..Self::default()
        }
    }

    pub fn tick_seconds(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }

    /// Tick duration rounded to whole milliseconds, never below one.
    pub fn tick_millis(&self) -> Timestamp {
        (self.tick_duration.as_millis() as Timestamp).max(1)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let invalid = |reason: &str| {
            Err(SyncError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.tick_duration.is_zero() {
            return invalid("tick duration must be positive");
        }
        if self.substeps == 0 {
            return invalid("at least one physics sub-step is required");
        }
        if self.history_retention_ms < self.playback_buffer_ms {
            return invalid("history retention must cover the playback buffering interval");
        }
        if self.playback_queue_depth < 2 {
            return invalid("playback queue must hold at least two samples");
        }
        if self.broad_phase_distance.is_nan() || self.broad_phase_distance < 0.0 {
            return invalid("broad-phase distance must be non-negative");
        }
        if self.bounds.min_x >= self.bounds.max_x || self.bounds.ground_y >= self.bounds.ceiling_y {
            return invalid("world bounds are empty");
        }
        Ok(())
    }
}
