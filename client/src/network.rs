use crate::game::MirrorState;
use crate::input::Autopilot;
use log::{debug, error, info, warn};
use shared::{
    EntityId, InterpolationPlayback, Packet, SimClock, SimConfig, Timestamp, MAX_PACKET_SIZE,
    PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Playbacks of mirrored entities, shared with the receive task so snapshot
/// samples are enqueued without waiting for the update loop.
pub type PlaybackRegistry = Arc<RwLock<HashMap<EntityId, Arc<InterpolationPlayback>>>>;

/// Packets forwarded from the receive task to the update loop
#[derive(Debug)]
pub struct Incoming {
    pub packet: Packet,
    pub arrival: Timestamp,
}

pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,

    state: MirrorState,
    autopilot: Autopilot,
    playbacks: PlaybackRegistry,
    clock: SimClock,
    tick_duration: Duration,

    fake_ping_ms: u64,
    duration: Option<Duration>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        config: SimConfig,
        fake_ping_ms: u64,
        autopilot: Autopilot,
        duration: Option<Duration>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let server_addr = server_addr.parse()?;
        let tick_duration = config.tick_duration;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            state: MirrorState::new(config)?,
            autopilot,
            playbacks: Arc::new(RwLock::new(HashMap::new())),
            clock: SimClock::new(),
            tick_duration,
            fake_ping_ms,
            duration,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(packet).await
    }

    /// Sends a packet, delayed by half the simulated round trip.
    async fn send_packet(&self, packet: Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;

        if self.fake_ping_ms == 0 {
            self.socket.send_to(&data, self.server_addr).await?;
            return Ok(());
        }

        let socket = Arc::clone(&self.socket);
        let server_addr = self.server_addr;
        let delay = Duration::from_millis(self.fake_ping_ms / 2);
        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = socket.send_to(&data, server_addr).await {
                error!("Error sending delayed packet: {}", e);
            }
        });
        Ok(())
    }

    /// Spawns the receive task. Snapshot samples go straight into the
    /// registered playbacks; everything else is forwarded to the loop.
    fn spawn_receiver(&self) -> mpsc::UnboundedReceiver<Incoming> {
        let (tx, rx) = mpsc::unbounded_channel();
        let socket = Arc::clone(&self.socket);
        let playbacks = Arc::clone(&self.playbacks);
        let clock = self.clock;
        let delay = Duration::from_millis(self.fake_ping_ms / 2);

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];
            loop {
                let len = match socket.recv_from(&mut buffer).await {
                    Ok((len, _)) => len,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };
                let packet = match Packet::decode(&buffer[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Dropping datagram: {}", e);
                        continue;
                    }
                };

                if !delay.is_zero() {
                    sleep(delay).await;
                }
                let arrival = clock.now();

                if let Packet::Snapshots { ref updates, .. } = packet {
                    let registry = playbacks.read().await;
                    for update in updates {
                        if let Some(playback) = registry.get(&update.id) {
                            playback.enqueue(update.snapshot, arrival);
                        }
                    }
                    continue;
                }

                if tx.send(Incoming { packet, arrival }).is_err() {
                    break;
                }
            }
        });

        rx
    }

    async fn handle_packet(&mut self, packet: Packet, arrival: Timestamp) {
        match packet {
            Packet::Connected {
                client_id,
                entity_id,
                tick_rate,
            } => {
                info!(
                    "Connected! Client ID: {}, server at {}Hz",
                    client_id, tick_rate
                );
                self.client_id = Some(client_id);
                self.connected = true;
                self.state.set_own_aircraft(entity_id);
            }

            Packet::Spawn { entities } => {
                let added = self.state.apply_spawns(&entities, arrival);
                let mut registry = self.playbacks.write().await;
                for id in added {
                    if let Some(playback) = self.state.world().playback(id) {
                        registry.insert(id, playback);
                    }
                }
            }

            // Normally consumed by the receive task; kept for completeness
            // when packets are injected directly.
            Packet::Snapshots { updates, .. } => {
                self.state.apply_snapshots(&updates, arrival);
            }

            Packet::Despawn {
                entity_id,
                destroyed,
            } => {
                self.playbacks.write().await.remove(&entity_id);
                let debris = self.state.apply_despawn(entity_id, destroyed);
                if !debris.is_empty() {
                    debug!("Spawned {} debris pieces", debris.len());
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.client_id = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    /// Sends scripted steering and fire requests for the own aircraft.
    async fn fly(&mut self, now: Timestamp) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }
        let Some(rotation) = self.state.own_rotation() else {
            return Ok(());
        };

        let input = self.autopilot.update(now, rotation);
        if let Some(steering) = input.steering {
            self.send_packet(Packet::Control {
                acceleration: steering.acceleration,
                rotation_speed: steering.rotation_speed,
            })
            .await?;
        }
        if let Some(kind) = input.fire {
            let view_timestamp = self.state.view_timestamp(now);
            self.send_packet(Packet::Fire {
                kind,
                view_timestamp,
            })
            .await?;
        }
        Ok(())
    }

    fn log_playback_stats(&self) {
        for (id, stats) in self.state.playback_stats() {
            debug!(
                "{}: received {}, discarded {}, starved {}, fast-forwards {}",
                id, stats.received, stats.discarded, stats.starved_reads, stats.fast_forwards
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut incoming = self.spawn_receiver();
        self.connect().await?;

        let mut update_interval = interval(self.tick_duration);
        update_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_interval = interval(Duration::from_secs(5));

        let deadline = self.duration.map(|d| tokio::time::Instant::now() + d);

        loop {
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                info!("Run duration elapsed");
                break;
            }

            tokio::select! {
                message = incoming.recv() => {
                    match message {
                        Some(Incoming { packet, arrival }) => self.handle_packet(packet, arrival).await,
                        None => {
                            error!("Receive task stopped");
                            break;
                        }
                    }
                },

                _ = update_interval.tick() => {
                    let now = self.clock.now();
                    if let Err(e) = self.state.step(now) {
                        error!("Mirror halted: {}", e);
                        return Err(e.into());
                    }
                    if let Err(e) = self.fly(now).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = stats_interval.tick() => {
                    info!(
                        "Mirroring {} entities, {} with playback",
                        self.state.world().len(),
                        self.playbacks.read().await.len()
                    );
                    self.log_playback_stats();
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(Packet::Disconnect).await;
            // Let a delayed disconnect leave before the runtime stops.
            sleep(Duration::from_millis(self.fake_ping_ms / 2 + 10)).await;
        }

        Ok(())
    }

    pub fn state(&self) -> &MirrorState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EntityKind, SpawnInfo, Snapshot, Vec2};

    async fn client() -> Client {
        Client::new(
            "127.0.0.1:9",
            SimConfig::default(),
            0,
            Autopilot::default(),
            None,
        )
        .await
        .unwrap()
    }

    fn spawn_packet(id: u32) -> Packet {
        Packet::Spawn {
            entities: vec![SpawnInfo {
                id: EntityId(id),
                kind: EntityKind::Aircraft,
                owner: None,
                snapshot: Snapshot::new(Vec2::new(0.0, 500.0), Vec2::ZERO, 0.0, 0),
            }],
        }
    }

    #[tokio::test]
    async fn test_connected_assigns_aircraft() {
        let mut client = client().await;
        client
            .handle_packet(
                Packet::Connected {
                    client_id: 4,
                    entity_id: EntityId(2),
                    tick_rate: 60,
                },
                0,
            )
            .await;
        assert!(client.is_connected());
        assert_eq!(client.state().own_aircraft(), Some(EntityId(2)));
    }

    #[tokio::test]
    async fn test_spawn_registers_playback() {
        let mut client = client().await;
        client.handle_packet(spawn_packet(3), 10).await;

        let registry = client.playbacks.read().await;
        let playback = registry.get(&EntityId(3)).unwrap();
        assert_eq!(playback.stats().received, 1);
        assert!(client.state().world().contains(EntityId(3)));
    }

    #[tokio::test]
    async fn test_despawn_unregisters_playback() {
        let mut client = client().await;
        client.handle_packet(spawn_packet(3), 10).await;
        client
            .handle_packet(
                Packet::Despawn {
                    entity_id: EntityId(3),
                    destroyed: true,
                },
                20,
            )
            .await;

        assert!(client.playbacks.read().await.is_empty());
        assert!(!client.state().world().contains(EntityId(3)));
        assert_eq!(
            client.state().world().len(),
            crate::game::DEBRIS_PIECES
        );
    }

    #[tokio::test]
    async fn test_disconnected_resets_connection() {
        let mut client = client().await;
        client.connected = true;
        client.client_id = Some(1);
        client
            .handle_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                0,
            )
            .await;
        assert!(!client.is_connected());
        assert!(client.client_id.is_none());
    }
}
