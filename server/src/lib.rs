//! # Flight Combat Server Library
//!
//! Authoritative server for the networked flight-combat simulation. It owns
//! the canonical [`shared::World`], turns client commands into steering and
//! launches, resolves hits and broadcasts snapshots that clients replay
//! through interpolation playback.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! - Connection tracking and client id assignment
//! - The aircraft each client flies
//! - Per-client command buffers, drained in arrival order each tick
//! - Timeout detection
//!
//! ### Game Module (`game`)
//! - The server-side `World` and the respawn of shot-down pilots
//! - Launch rules and cooldowns for bullets and missiles
//! - Validation of steering input and attack claims
//!
//! ### Network Module (`network`)
//! - UDP socket management and bincode packet codec
//! - Fixed-rate tick loop: commands, simulation, broadcast
//! - Spawn and despawn announcements
//!
//! ## Lag Compensation
//!
//! A `Fire` packet carries the server time the pilot was looking at. The
//! launched impactor remembers it, and while the impactor is in flight its
//! collision checks run against each target's recorded history at the
//! corresponding earlier moment instead of the current pose.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::SimConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", SimConfig::with_tick_rate(60), 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Internal tasks:
//! - **Network Receiver**: decodes datagrams and stamps their arrival time
//! - **Network Sender**: encodes and sends queued packets and broadcasts
//! - **Timeout Checker**: drops clients that went silent
//! - **Main Loop**: applies commands, steps the world, broadcasts snapshots

pub mod client_manager;
pub mod game;
pub mod network;
