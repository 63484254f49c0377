//! Scripted pilot input with change detection and keep-alive pacing

use shared::{EntityKind, Steering, Timestamp, Vec2};

/// Control packets are re-sent at least this often so the server keeps
/// the client alive even when steering does not change.
pub const KEEP_ALIVE_MS: Timestamp = 250;

/// One decision of the autopilot for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PilotInput {
    pub steering: Option<Steering>,
    pub fire: Option<EntityKind>,
}

/// Flies a slow weave and fires on a fixed rhythm.
///
/// Turning direction flips every `weave_period_ms`; bullets are fired every
/// `fire_period_ms` and every fourth shot is a missile.
pub struct Autopilot {
    weave_period_ms: Timestamp,
    fire_period_ms: Timestamp,
    turn_rate: f32,
    thrust: f32,

    current: Steering,
    last_sent: Option<Timestamp>,
    last_fire: Option<Timestamp>,
    shots: u32,
}

impl Autopilot {
    pub fn new(weave_period_ms: Timestamp, fire_period_ms: Timestamp) -> Self {
        Self {
            weave_period_ms: weave_period_ms.max(1),
            fire_period_ms,
            turn_rate: 0.8,
            thrust: 120.0,
            current: Steering::default(),
            last_sent: None,
            last_fire: None,
            shots: 0,
        }
    }

    /// Desired steering at local time `now` for an aircraft heading `rotation`.
    pub fn steering_at(&self, now: Timestamp, rotation: f32) -> Steering {
        let phase = (now / self.weave_period_ms) % 2;
        let rotation_speed = if phase == 0 {
            self.turn_rate
        } else {
            -self.turn_rate
        };
        Steering {
            acceleration: Vec2::new(self.thrust, 0.0).rotate(rotation),
            rotation_speed,
        }
    }

    /// Samples the script and returns what should go on the wire this frame.
    pub fn update(&mut self, now: Timestamp, rotation: f32) -> PilotInput {
        let steering = self.steering_at(now, rotation);

        let changed = steering.rotation_speed != self.current.rotation_speed;
        let keep_alive = self
            .last_sent
            .map_or(true, |last| now.saturating_sub(last) >= KEEP_ALIVE_MS);

        let mut input = PilotInput::default();
        if changed || keep_alive {
            self.current = steering;
            self.last_sent = Some(now);
            input.steering = Some(steering);
        }

        if self.fire_period_ms > 0 {
            let due = self
                .last_fire
                .map_or(true, |last| now.saturating_sub(last) >= self.fire_period_ms);
            if due {
                self.last_fire = Some(now);
                self.shots += 1;
                input.fire = Some(if self.shots % 4 == 0 {
                    EntityKind::Missile
                } else {
                    EntityKind::Bullet
                });
            }
        }

        input
    }

    pub fn shots_fired(&self) -> u32 {
        self.shots
    }
}

impl Default for Autopilot {
    fn default() -> Self {
        Self::new(2000, 400)
    }
}
