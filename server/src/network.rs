//! Server network layer handling UDP communications and the tick loop

use crate::client_manager::{ClientCommand, ClientManager, TimedCommand};
use crate::game::{CommandOutcome, GameState};
use log::{debug, error, info, warn};
use shared::{
    EntityId, Packet, RemovalReason, SimClock, SimConfig, SpawnInfo, Steering, SyncError,
    TickReport, Timestamp, MAX_PACKET_SIZE, MAX_UPDATES_PER_PACKET, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
        received_at: Timestamp,
    },
    ClientTimeout {
        client_id: u32,
        entity_id: Option<EntityId>,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and the authoritative simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    clock: SimClock,
    tick_duration: Duration,
    tick_rate: u32,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: SimConfig,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let tick_duration = config.tick_duration;
        let tick_rate = (1.0 / config.tick_seconds()).round() as u32;
        let game_state = GameState::new(config)?;

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state,
            clock: SimClock::new(),
            tick_duration,
            tick_rate,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();
        let clock = self.clock;

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            let message = ServerMessage::PacketReceived {
                                packet,
                                addr,
                                received_at: clock.now(),
                            };
                            if let Err(e) = server_tx.send(message) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        let data = match packet.encode() {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        client_id: client.id,
                        entity_id: client.entity_id,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket { packet, exclude }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    fn announce(&self, entities: Vec<SpawnInfo>, exclude: Option<u32>) {
        if !entities.is_empty() {
            self.broadcast_packet(Packet::Spawn { entities }, exclude);
        }
    }

    /// Gives a client a new aircraft. The pilot hears about it right after
    /// `Connected`; everyone else through a broadcast.
    async fn spawn_pilot(&mut self, client_id: u32, addr: SocketAddr) {
        let entity_id = self.game_state.add_player(client_id);
        self.clients
            .write()
            .await
            .assign_entity(client_id, Some(entity_id));

        self.send_packet(
            Packet::Connected {
                client_id,
                entity_id,
                tick_rate: self.tick_rate,
            },
            addr,
        );
        if let Some(info) = self.game_state.world().spawn_info(entity_id) {
            self.send_packet(
                Packet::Spawn {
                    entities: vec![info],
                },
                addr,
            );
            self.announce(vec![info], Some(client_id));
        }
    }

    fn drop_pilot(&mut self, entity_id: Option<EntityId>) {
        let Some(entity_id) = entity_id else {
            return;
        };
        if self.game_state.remove_player(entity_id).is_ok() {
            self.broadcast_packet(
                Packet::Despawn {
                    entity_id,
                    destroyed: false,
                },
                None,
            );
        }
    }

    /// Processes incoming packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, received_at: Timestamp) {
        let client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };

        if let Some(client_id) = client_id {
            self.clients.write().await.touch(client_id);
        }

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch (server {}, client {})",
                        PROTOCOL_VERSION, client_version
                    );
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let existing = self.clients.write().await.remove_client(&existing_id);
                    self.drop_pilot(existing.and_then(|c| c.entity_id));
                }

                let new_id = self.clients.write().await.add_client(addr);
                match new_id {
                    Some(new_id) => {
                        // Existing entities first; spawn_pilot follows
                        // with the new aircraft.
                        let world = self.game_state.world().networked_entities();
                        for chunk in world.chunks(MAX_UPDATES_PER_PACKET) {
                            self.send_packet(
                                Packet::Spawn {
                                    entities: chunk.to_vec(),
                                },
                                addr,
                            );
                        }
                        self.spawn_pilot(new_id, addr).await;
                    }
                    None => {
                        let reason = "Server full".to_string();
                        self.send_packet(Packet::Disconnected { reason }, addr);
                    }
                }
            }

            Packet::Control {
                acceleration,
                rotation_speed,
            } => {
                self.queue_command(
                    client_id,
                    received_at,
                    ClientCommand::Control(Steering {
                        acceleration,
                        rotation_speed,
                    }),
                )
                .await
            }

            Packet::Fire {
                kind,
                view_timestamp,
            } => {
                self.queue_command(
                    client_id,
                    received_at,
                    ClientCommand::Fire {
                        kind,
                        view_timestamp,
                    },
                )
                .await
            }

            Packet::Attack {
                impactor,
                target,
                impact_timestamp,
            } => {
                self.queue_command(
                    client_id,
                    received_at,
                    ClientCommand::Attack {
                        impactor,
                        target,
                        impact_timestamp,
                    },
                )
                .await
            }

            Packet::Disconnect => {
                if let Some(client_id) = client_id {
                    let removed = self.clients.write().await.remove_client(&client_id);
                    self.drop_pilot(removed.and_then(|c| c.entity_id));
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn queue_command(
        &self,
        client_id: Option<u32>,
        received_at: Timestamp,
        command: ClientCommand,
    ) {
        let Some(client_id) = client_id else {
            debug!("Command from unknown client ignored");
            return;
        };
        self.clients.write().await.add_command(
            client_id,
            TimedCommand {
                received_at,
                command,
            },
        );
    }

    /// Applies buffered client commands to the world
    async fn process_commands(&mut self) -> Result<(), SyncError> {
        let commands = self.clients.write().await.drain_commands();
        let mut launched = Vec::new();

        for (client_id, timed) in commands {
            let pilot = self.clients.read().await.entity_of(client_id);
            let Some(pilot) = pilot else {
                continue;
            };
            match self
                .game_state
                .apply_command(pilot, timed.command, timed.received_at)?
            {
                CommandOutcome::Launched(info) => launched.push(info),
                CommandOutcome::Hit(hit) => {
                    debug!("Confirmed attack claim from client {}: {:?}", client_id, hit)
                }
                CommandOutcome::Steered | CommandOutcome::Ignored => {}
            }
        }

        self.announce(launched, None);
        Ok(())
    }

    /// Broadcasts despawns and respawns aircraft of clients that were shot down
    async fn handle_report(&mut self, report: &TickReport) {
        for removal in &report.removed {
            if !shared::sync::is_networked(removal.kind) {
                continue;
            }
            let destroyed = removal.reason == RemovalReason::Destroyed;
            self.broadcast_packet(
                Packet::Despawn {
                    entity_id: removal.id,
                    destroyed,
                },
                None,
            );

            let pilot_of = self.clients.read().await.find_client_by_entity(removal.id);
            if let Some(client_id) = pilot_of {
                info!("Client {} was shot down", client_id);
                let addr = self
                    .clients
                    .read()
                    .await
                    .get_client_addrs()
                    .into_iter()
                    .find(|(id, _)| *id == client_id)
                    .map(|(_, addr)| addr);
                if let Some(addr) = addr {
                    self.spawn_pilot(client_id, addr).await;
                }
            }
        }
    }

    /// Broadcasts this tick's due snapshots to all connected clients
    fn broadcast_snapshots(&self) {
        let updates = self.game_state.world().collect_outgoing();
        if updates.is_empty() {
            return;
        }

        let tick = self.game_state.tick();
        let timestamp = self.game_state.world().now();
        for chunk in updates.chunks(MAX_UPDATES_PER_PACKET) {
            self.broadcast_packet(
                Packet::Snapshots {
                    tick,
                    timestamp,
                    updates: chunk.to_vec(),
                },
                None,
            );
        }
    }

    /// Runs one tick: commands, simulation, broadcast
    async fn tick(&mut self) -> Result<(), SyncError> {
        self.process_commands().await?;

        let now = self.clock.now();
        let report = self.game_state.step(now)?;
        self.handle_report(&report).await;

        let client_count = self.clients.read().await.len();
        if client_count > 0 {
            self.broadcast_snapshots();
        }

        if report.tick % 60 == 0 && client_count > 0 {
            debug!(
                "Tick {}: {} clients, {} entities, {} secondary updates due",
                report.tick,
                client_count,
                self.game_state.world().len(),
                report.secondary_due.len()
            );
        }
        Ok(())
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started at {}Hz", self.tick_rate);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr, received_at }) => {
                            self.handle_packet(packet, addr, received_at).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id, entity_id }) => {
                            info!("Client {} timed out", client_id);
                            self.drop_pilot(entity_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Simulation halted: {}", e);
                        return Err(e.into());
                    }
                },
            }
        }

        Ok(())
    }
}
