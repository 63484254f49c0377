//! Authoritative game state: the server's `World` plus the rules for turning
//! client commands into steering and newly launched impactors.

use crate::client_manager::ClientCommand;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    EntityId, EntityKind, EntitySpec, HitEvent, Side, SimConfig, SpawnInfo, Steering, SyncError,
    TickReport, Timestamp, Vec2, World,
};
use std::collections::HashMap;

/// Largest steering acceleration accepted from a client, units/s².
pub const MAX_ACCELERATION: f32 = 400.0;
/// Largest turn rate accepted from a client, rad/s.
pub const MAX_TURN_RATE: f32 = 3.0;
pub const AIRCRAFT_SPEED: f32 = 180.0;

/// Launch parameters for impactor kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Launcher {
    pub muzzle_speed: f32,
    pub cooldown_ms: Timestamp,
}

pub fn launcher(kind: EntityKind) -> Option<Launcher> {
    match kind {
        EntityKind::Bullet => Some(Launcher {
            muzzle_speed: 900.0,
            cooldown_ms: 100,
        }),
        EntityKind::Missile => Some(Launcher {
            muzzle_speed: 350.0,
            cooldown_ms: 1500,
        }),
        EntityKind::Aircraft | EntityKind::Debris => None,
    }
}

pub struct GameState {
    world: World,
    last_fire: HashMap<(EntityId, EntityKind), Timestamp>,
}

impl GameState {
    pub fn new(config: SimConfig) -> Result<Self, SyncError> {
        Ok(Self {
            world: World::new(config, Side::Server)?,
            last_fire: HashMap::new(),
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    /// Spawns a fresh aircraft for a client somewhere in the air.
    pub fn add_player(&mut self, client_id: u32) -> EntityId {
        let bounds = self.world.config().bounds;
        let mut rng = rand::thread_rng();
        let x = rng.gen_range(bounds.min_x * 0.5..bounds.max_x * 0.5);
        let y = rng.gen_range(bounds.ceiling_y * 0.3..bounds.ceiling_y * 0.7);
        let heading = if x > 0.0 { std::f32::consts::PI } else { 0.0 };

        let entity_id = self.world.spawn(
            EntitySpec::new(EntityKind::Aircraft, Vec2::new(x, y))
                .with_rotation(heading)
                .with_velocity(Vec2::new(AIRCRAFT_SPEED, 0.0).rotate(heading)),
        );
        info!(
            "Added aircraft {} for client {} at ({:.0}, {:.0})",
            entity_id, client_id, x, y
        );
        entity_id
    }

    pub fn remove_player(&mut self, entity_id: EntityId) -> Result<(), SyncError> {
        self.world.despawn(entity_id)?;
        self.last_fire.retain(|(owner, _), _| *owner != entity_id);
        info!("Removed aircraft {}", entity_id);
        Ok(())
    }

    /// Applies one client command on behalf of the aircraft `pilot`.
    ///
    /// Returns the announcement of a newly launched impactor, or the hit
    /// confirmed by an attack claim.
    pub fn apply_command(
        &mut self,
        pilot: EntityId,
        command: ClientCommand,
        now: Timestamp,
    ) -> Result<CommandOutcome, SyncError> {
        match command {
            ClientCommand::Control(steering) => {
                if !self.world.contains(pilot) {
                    return Ok(CommandOutcome::Ignored);
                }
                self.world.steer(pilot, sanitize_steering(steering))?;
                Ok(CommandOutcome::Steered)
            }
            ClientCommand::Fire {
                kind,
                view_timestamp,
            } => Ok(self
                .fire(pilot, kind, view_timestamp, now)
                .map_or(CommandOutcome::Ignored, CommandOutcome::Launched)),
            ClientCommand::Attack {
                impactor,
                target,
                impact_timestamp,
            } => {
                let owned = self
                    .world
                    .get(impactor)
                    .is_some_and(|e| e.owner() == Some(pilot));
                if !owned || !self.world.contains(target) {
                    warn!(
                        "Rejected attack claim by {}: {} -> {}",
                        pilot, impactor, target
                    );
                    return Ok(CommandOutcome::Ignored);
                }
                Ok(self
                    .world
                    .on_remote_attack(impactor, target, impact_timestamp)?
                    .map_or(CommandOutcome::Ignored, CommandOutcome::Hit))
            }
        }
    }

    fn fire(
        &mut self,
        pilot: EntityId,
        kind: EntityKind,
        view_timestamp: Option<Timestamp>,
        now: Timestamp,
    ) -> Option<SpawnInfo> {
        let launcher = launcher(kind)?;
        let aircraft = self.world.get(pilot)?;

        let ready = self
            .last_fire
            .get(&(pilot, kind))
            .map_or(true, |&last| now.saturating_sub(last) >= launcher.cooldown_ms);
        if !ready {
            debug!("{} fired {:?} during cooldown", pilot, kind);
            return None;
        }

        let heading = Vec2::new(1.0, 0.0).rotate(aircraft.rotation());
        let muzzle = aircraft.position() + heading * (aircraft.bounding_radius() + 2.0);
        let mut spec = EntitySpec::new(kind, muzzle)
            .with_velocity(aircraft.velocity() + heading * launcher.muzzle_speed)
            .with_rotation(aircraft.rotation())
            .with_owner(pilot);
        // View times from the future are clamped so the rewind never skips ahead.
        if let Some(view) = view_timestamp {
            spec = spec.with_origin_timestamp(view.min(self.world.now()));
        }

        let id = self.world.spawn(spec);
        self.last_fire.insert((pilot, kind), now);
        self.world.spawn_info(id)
    }

    pub fn step(&mut self, now: Timestamp) -> Result<TickReport, SyncError> {
        let report = self.world.step(now)?;
        for removal in &report.removed {
            self.last_fire.retain(|(owner, _), _| *owner != removal.id);
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome {
    Ignored,
    Steered,
    Launched(SpawnInfo),
    Hit(HitEvent),
}

/// Clamps client steering to the flight envelope. Non-finite input is
/// replaced by no steering at all.
pub fn sanitize_steering(steering: Steering) -> Steering {
    let Steering {
        acceleration,
        rotation_speed,
    } = steering;
    if !acceleration.x.is_finite() || !acceleration.y.is_finite() || !rotation_speed.is_finite() {
        return Steering::default();
    }

    let length = acceleration.length();
    let acceleration = if length > MAX_ACCELERATION {
        acceleration * (MAX_ACCELERATION / length)
    } else {
        acceleration
    };
    Steering {
        acceleration,
        rotation_speed: rotation_speed.clamp(-MAX_TURN_RATE, MAX_TURN_RATE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn game() -> GameState {
        GameState::new(SimConfig::default()).unwrap()
    }

    #[test]
    fn test_add_player_inside_bounds() {
        let mut game = game();
        let bounds = SimConfig::default().bounds;
        for client_id in 0..20 {
            let id = game.add_player(client_id);
            let aircraft = game.world().get(id).unwrap();
            assert!(aircraft.position().x > bounds.min_x && aircraft.position().x < bounds.max_x);
            assert!(aircraft.position().y > bounds.ground_y && aircraft.position().y < bounds.ceiling_y);
            assert_approx_eq!(aircraft.velocity().length(), AIRCRAFT_SPEED, 1e-2);
        }
    }

    #[test]
    fn test_sanitize_steering() {
        let clamped = sanitize_steering(Steering {
            acceleration: Vec2::new(3000.0, 4000.0),
            rotation_speed: -10.0,
        });
        assert_approx_eq!(clamped.acceleration.length(), MAX_ACCELERATION, 1e-2);
        assert_approx_eq!(clamped.acceleration.x / clamped.acceleration.y, 0.75, 1e-4);
        assert_eq!(clamped.rotation_speed, -MAX_TURN_RATE);

        let garbage = sanitize_steering(Steering {
            acceleration: Vec2::new(f32::NAN, 0.0),
            rotation_speed: 1.0,
        });
        assert_eq!(garbage, Steering::default());
    }

    #[test]
    fn test_fire_launches_owned_impactor() {
        let mut game = game();
        let pilot = game.add_player(1);
        game.step(16).unwrap();

        let outcome = game
            .apply_command(
                pilot,
                ClientCommand::Fire {
                    kind: EntityKind::Bullet,
                    view_timestamp: Some(10),
                },
                16,
            )
            .unwrap();

        let CommandOutcome::Launched(info) = outcome else {
            panic!("expected a launch, got {:?}", outcome);
        };
        assert_eq!(info.kind, EntityKind::Bullet);
        assert_eq!(info.owner, Some(pilot));

        let bullet = game.world().get(info.id).unwrap();
        assert_eq!(bullet.origin_timestamp(), Some(10));
        let aircraft = game.world().get(pilot).unwrap();
        assert!(bullet.velocity().length() > aircraft.velocity().length());
    }

    #[test]
    fn test_fire_respects_cooldown_and_kind() {
        let mut game = game();
        let pilot = game.add_player(1);
        let fire = |kind| ClientCommand::Fire {
            kind,
            view_timestamp: None,
        };

        assert!(matches!(
            game.apply_command(pilot, fire(EntityKind::Missile), 0).unwrap(),
            CommandOutcome::Launched(_)
        ));
        assert_eq!(
            game.apply_command(pilot, fire(EntityKind::Missile), 500).unwrap(),
            CommandOutcome::Ignored
        );
        assert!(matches!(
            game.apply_command(pilot, fire(EntityKind::Bullet), 500).unwrap(),
            CommandOutcome::Launched(_)
        ));
        assert_eq!(
            game.apply_command(pilot, fire(EntityKind::Aircraft), 5000).unwrap(),
            CommandOutcome::Ignored
        );
    }

    #[test]
    fn test_future_view_timestamp_is_clamped() {
        let mut game = game();
        let pilot = game.add_player(1);
        game.step(100).unwrap();

        let outcome = game
            .apply_command(
                pilot,
                ClientCommand::Fire {
                    kind: EntityKind::Bullet,
                    view_timestamp: Some(10_000),
                },
                100,
            )
            .unwrap();
        let CommandOutcome::Launched(info) = outcome else {
            panic!("expected a launch");
        };
        assert_eq!(game.world().get(info.id).unwrap().origin_timestamp(), Some(100));
    }

    #[test]
    fn test_attack_claim_requires_ownership() {
        let mut game = game();
        let pilot = game.add_player(1);
        let other = game.add_player(2);
        let CommandOutcome::Launched(info) = game
            .apply_command(
                other,
                ClientCommand::Fire {
                    kind: EntityKind::Bullet,
                    view_timestamp: None,
                },
                0,
            )
            .unwrap()
        else {
            panic!("expected a launch");
        };

        let claim = ClientCommand::Attack {
            impactor: info.id,
            target: other,
            impact_timestamp: 0,
        };
        assert_eq!(
            game.apply_command(pilot, claim, 0).unwrap(),
            CommandOutcome::Ignored
        );
    }

    #[test]
    fn test_control_for_missing_aircraft_is_ignored() {
        let mut game = game();
        let outcome = game
            .apply_command(
                EntityId(77),
                ClientCommand::Control(Steering::default()),
                0,
            )
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Ignored);
    }

    #[test]
    fn test_remove_player() {
        let mut game = game();
        let pilot = game.add_player(1);
        game.remove_player(pilot).unwrap();
        assert!(!game.world().contains(pilot));
        assert_eq!(
            game.remove_player(pilot),
            Err(SyncError::EntityNotFound(pilot))
        );
    }
}
