//! # Flight Combat Client Library
//!
//! Headless client for the networked flight-combat simulation. It mirrors the
//! server's world, replays every networked entity through interpolation
//! playback and flies its own aircraft with a scripted autopilot.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - `MirrorState`: a client-side `World` fed by spawn, snapshot and despawn
//!   packets
//! - Local debris when an aircraft is shot down
//! - The view timestamp stamped onto fire requests
//!
//! ### Input Module (`input`)
//! - `Autopilot`: scripted weave and fire rhythm
//! - Change detection and keep-alive pacing for control packets
//!
//! ### Network Module (`network`)
//! - UDP socket and bincode packet codec
//! - A receive task that feeds snapshot samples straight into the shared
//!   playbacks
//! - Simulated latency for testing
//!
//! ## Playback Timing
//!
//! Remote entities are displayed a fixed buffering interval behind the
//! newest server snapshot, so there is normally a sample on either side of
//! the displayed moment. The displayed server time is sent with every fire
//! request, which lets the server check hits against what this client saw.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{input::Autopilot, network::Client};
//! use shared::SimConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client =
//!         Client::new("127.0.0.1:8080", SimConfig::default(), 0, Autopilot::default(), None)
//!             .await?;
//!     client.run().await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
