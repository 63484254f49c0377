//! Client roster for the authoritative server
//!
//! This module tracks everything the server knows about a connected client:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - The aircraft entity the client flies
//! - Commands received between ticks, drained in arrival order
//! - Capacity limits and address lookup
//!
//! Commands are only buffered here. The tick loop drains them and applies
//! them to the world before the next step.

use log::info;
use shared::{EntityId, EntityKind, Steering, Timestamp};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Clients silent for longer than this are dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A request from a client, applied at the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientCommand {
    Control(Steering),
    Fire {
        kind: EntityKind,
        view_timestamp: Option<Timestamp>,
    },
    Attack {
        impactor: EntityId,
        target: EntityId,
        impact_timestamp: Timestamp,
    },
}

/// A command stamped with the server time it arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedCommand {
    pub received_at: Timestamp,
    pub command: ClientCommand,
}

#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Aircraft currently flown by this client, if alive
    pub entity_id: Option<EntityId>,
    pub pending_commands: Vec<TimedCommand>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            entity_id: None,
            pending_commands: Vec::new(),
        }
    }

    /// Buffers a command and marks the client as active.
    pub fn add_command(&mut self, command: TimedCommand) {
        self.last_seen = Instant::now();
        self.pending_commands.push(command);
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Enforces the capacity limit and hands out client ids, which increase
/// monotonically and are never reused during a server run.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns the new client id, or None when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client, returning it so the caller can despawn its aircraft.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn find_client_by_entity(&self, entity_id: EntityId) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.entity_id == Some(entity_id))
            .map(|(id, _)| *id)
    }

    pub fn assign_entity(&mut self, client_id: u32, entity_id: Option<EntityId>) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.entity_id = entity_id;
                true
            }
            None => false,
        }
    }

    pub fn entity_of(&self, client_id: u32) -> Option<EntityId> {
        self.clients.get(&client_id).and_then(|c| c.entity_id)
    }

    pub fn add_command(&mut self, client_id: u32, command: TimedCommand) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.add_command(command);
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
        }
    }

    /// Takes every buffered command, ordered by arrival time then client id.
    pub fn drain_commands(&mut self) -> Vec<(u32, TimedCommand)> {
        let mut all_commands: Vec<(u32, TimedCommand)> = self
            .clients
            .iter_mut()
            .flat_map(|(id, client)| {
                let id = *id;
                client
                    .pending_commands
                    .drain(..)
                    .map(move |command| (id, command))
            })
            .collect();

        // Stable sort keeps each client's own order for equal timestamps.
        all_commands.sort_by_key(|(id, command)| (command.received_at, *id));
        all_commands
    }

    /// Removes clients that went silent and returns them.
    pub fn check_timeouts(&mut self) -> Vec<Client> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        timed_out
            .iter()
            .filter_map(|client_id| self.remove_client(client_id))
            .collect()
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
