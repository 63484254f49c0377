//! Integration tests for networked flight-combat components
//!
//! These tests validate cross-component interactions and real network behavior.

use assert_approx_eq::assert_approx_eq;
use client::game::MirrorState;
use shared::{
    EntityId, EntityKind, EntitySpec, EntityUpdate, Packet, PoseSource, ShapePolygon, Side,
    SimConfig, Snapshot, SpawnInfo, Timestamp, Vec2, World, PROTOCOL_VERSION,
};
use std::time::Duration;

const TICK_MS: Timestamp = 16;
const LATENCY_MS: Timestamp = 30;

fn square_aircraft(position: Vec2, velocity: Vec2) -> EntitySpec {
    EntitySpec::new(EntityKind::Aircraft, position)
        .with_velocity(velocity)
        .with_shape(ShapePolygon::rectangle(20.0, 20.0))
}

/// Runs `ticks` server ticks, delivering every snapshot batch to the mirror
/// after a fixed one-way latency and stepping the mirror on arrival.
fn run_linked(server: &mut World, mirror: &mut MirrorState, ticks: Timestamp) {
    mirror.apply_spawns(&server.networked_entities(), server.now() + LATENCY_MS);
    for k in 1..=ticks {
        let now = k * TICK_MS;
        server.step(now).unwrap();
        let arrival = now + LATENCY_MS;
        mirror.apply_snapshots(&server.collect_outgoing(), arrival);
        mirror.step(arrival).unwrap();
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests packet serialization round-trip for network protocol validation
    #[test]
    fn packet_serialization_roundtrip() {
        let snapshot = Snapshot::new(Vec2::new(10.0, 20.0), Vec2::new(1.0, 0.0), 0.5, 320);
        let test_packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
            },
            Packet::Control {
                acceleration: Vec2::new(40.0, -3.0),
                rotation_speed: 1.25,
            },
            Packet::Fire {
                kind: EntityKind::Bullet,
                view_timestamp: None,
            },
            Packet::Connected {
                client_id: 42,
                entity_id: EntityId(7),
                tick_rate: 60,
            },
            Packet::Spawn {
                entities: vec![SpawnInfo {
                    id: EntityId(9),
                    kind: EntityKind::Missile,
                    owner: Some(EntityId(7)),
                    snapshot,
                }],
            },
            Packet::Despawn {
                entity_id: EntityId(9),
                destroyed: true,
            },
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
        ];

        for packet in test_packets {
            let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    /// Tests malformed packet handling
    #[test]
    fn malformed_packet_handling() {
        let valid_data = Packet::Snapshots {
            tick: 3,
            timestamp: 48,
            updates: vec![EntityUpdate {
                id: EntityId(1),
                snapshot: Snapshot::new(Vec2::ZERO, Vec2::ZERO, 0.0, 48),
            }],
        }
        .encode()
        .unwrap();

        let truncated = &valid_data[..valid_data.len() / 2];
        assert!(
            Packet::decode(truncated).is_err(),
            "Should fail to decode truncated packet"
        );

        let mut corrupted = valid_data.clone();
        corrupted[0] = 0xFF;
        assert!(
            Packet::decode(&corrupted).is_err(),
            "Should fail to decode corrupted packet"
        );

        assert!(
            Packet::decode(&[]).is_err(),
            "Should fail to decode empty packet"
        );
    }
}

/// SERVER-TO-MIRROR SYNCHRONIZATION TESTS
mod sync_tests {
    use super::*;

    /// The mirror displays the aircraft one buffering interval behind the
    /// server, blended between the bracketing snapshots.
    #[test]
    fn mirror_trails_server_by_buffer() {
        let mut server = World::new(SimConfig::default(), Side::Server).unwrap();
        let mut mirror = MirrorState::new(SimConfig::default()).unwrap();
        let id = server.spawn(square_aircraft(Vec2::new(0.0, 500.0), Vec2::new(60.0, 0.0)));

        run_linked(&mut server, &mut mirror, 40);

        // The server moves one unit per tick of 16ms.
        assert_approx_eq!(server.get(id).unwrap().position().x, 40.0, 1e-3);

        // Displayed time: 670 - 30 - 100 = 540ms, i.e. tick 33.75.
        let mirrored = mirror.world().get(id).unwrap();
        assert!(mirrored.is_remote());
        assert_approx_eq!(mirrored.position().x, 33.75, 1e-2);
        assert_approx_eq!(mirrored.position().y, 500.0, 1e-3);

        let stats = mirror.playback_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].1.received, 41);
        assert_eq!(stats[0].1.discarded, 0);
    }

    /// A shot stamped with the time the mirror was displaying is resolved
    /// on the server against the target's pose at that time.
    #[test]
    fn view_timestamp_drives_server_rewind() {
        let mut server = World::new(SimConfig::default(), Side::Server).unwrap();
        let mut mirror = MirrorState::new(SimConfig::default()).unwrap();
        // Climbs ten units per tick.
        let target = server.spawn(square_aircraft(Vec2::new(300.0, 500.0), Vec2::new(0.0, 600.0)));

        run_linked(&mut server, &mut mirror, 10);
        assert_eq!(server.now(), 160);

        // Local clock slightly past the last arrival at 190ms.
        let view = mirror
            .world()
            .playback(target)
            .unwrap()
            .view_timestamp(194)
            .unwrap();
        assert_eq!(view, 64);

        let bullet = server.spawn(
            EntitySpec::new(EntityKind::Bullet, Vec2::new(275.0, 550.0))
                .with_velocity(Vec2::new(1200.0, 0.0))
                .with_owner(EntityId(999))
                .with_origin_timestamp(view),
        );
        let report = server.step(11 * TICK_MS).unwrap();

        assert_eq!(report.hits.len(), 1);
        let hit = report.hits[0];
        assert_eq!(hit.impactor, bullet);
        assert_eq!(hit.target, target);
        assert!(matches!(hit.pose, PoseSource::Historical(s) if s.timestamp == 80));
        assert_eq!(server.get(target).unwrap().hit_points(), 90);
    }

    /// Destroyed aircraft become local debris on the mirror, which is never
    /// sent back and falls under gravity.
    #[test]
    fn destroyed_aircraft_becomes_local_debris() {
        let mut server = World::new(SimConfig::default(), Side::Server).unwrap();
        let mut mirror = MirrorState::new(SimConfig::default()).unwrap();
        let id = server.spawn(square_aircraft(Vec2::new(0.0, 1500.0), Vec2::new(60.0, 0.0)));
        run_linked(&mut server, &mut mirror, 10);

        let debris = mirror.apply_despawn(id, true);
        assert!(!debris.is_empty());

        let start_y: Vec<f32> = debris
            .iter()
            .map(|d| mirror.world().get(*d).unwrap().position().y)
            .collect();
        mirror.step(400).unwrap();
        mirror.step(800).unwrap();

        for (piece, y0) in debris.iter().zip(start_y) {
            let entity = mirror.world().get(*piece).unwrap();
            assert!(!entity.is_remote());
            assert!(entity.velocity().y < 0.0 || entity.position().y < y0);
        }
        assert!(mirror.world().collect_outgoing().is_empty());
    }

    /// Reordered and duplicated snapshot deliveries never move playback
    /// backwards.
    #[test]
    fn reordered_snapshots_are_discarded() {
        let mut server = World::new(SimConfig::default(), Side::Server).unwrap();
        let mut mirror = MirrorState::new(SimConfig::default()).unwrap();
        let id = server.spawn(square_aircraft(Vec2::new(0.0, 500.0), Vec2::new(60.0, 0.0)));
        mirror.apply_spawns(&server.networked_entities(), LATENCY_MS);

        let mut batches = Vec::new();
        for k in 1..=4 {
            server.step(k * TICK_MS).unwrap();
            batches.push(server.collect_outgoing());
        }

        // Deliver 1, 3, 2, 3, 4.
        let order = [0usize, 2, 1, 2, 3];
        let accepted: usize = order
            .iter()
            .map(|&i| mirror.apply_snapshots(&batches[i], 200 + i as Timestamp))
            .sum();
        assert_eq!(accepted, 3);

        let stats = mirror.playback_stats();
        assert_eq!(stats[0].0, id);
        assert_eq!(stats[0].1.discarded, 2);
    }
}

/// CLIENT-SERVER INTEGRATION TESTS OVER UDP
mod client_server_tests {
    use super::*;
    use server::network::Server;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn start_server(max_clients: usize) -> std::net::SocketAddr {
        let mut server = Server::new("127.0.0.1:0", SimConfig::default(), max_clients)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; shared::MAX_PACKET_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    async fn connect(socket: &UdpSocket, server_addr: std::net::SocketAddr) {
        let data = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        }
        .encode()
        .unwrap();
        socket.send_to(&data, server_addr).await.unwrap();
    }

    /// Tests the connect handshake, own-aircraft announcement and snapshot
    /// stream over real sockets
    #[tokio::test]
    async fn connect_spawn_and_snapshot_stream() {
        let server_addr = start_server(4).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        connect(&socket, server_addr).await;

        let mut own = None;
        let mut announced = false;
        let mut snapshot_seen = false;
        for _ in 0..200 {
            match recv_packet(&socket).await {
                Packet::Connected {
                    entity_id,
                    tick_rate,
                    ..
                } => {
                    assert_eq!(tick_rate, 60);
                    own = Some(entity_id);
                }
                Packet::Spawn { entities } => {
                    announced |= entities
                        .iter()
                        .any(|e| Some(e.id) == own && e.kind == EntityKind::Aircraft);
                }
                Packet::Snapshots { updates, .. } => {
                    snapshot_seen |= updates.iter().any(|u| Some(u.id) == own);
                }
                other => panic!("Unexpected packet {:?}", other),
            }
            if announced && snapshot_seen {
                break;
            }
        }

        assert!(own.is_some());
        assert!(announced, "own aircraft was never announced");
        assert!(snapshot_seen, "no snapshot for own aircraft");

        let data = Packet::Disconnect.encode().unwrap();
        socket.send_to(&data, server_addr).await.unwrap();
    }

    /// Tests that the server refuses clients beyond capacity
    #[tokio::test]
    async fn full_server_refuses_connection() {
        let server_addr = start_server(1).await;

        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        connect(&first, server_addr).await;
        assert!(matches!(
            recv_packet(&first).await,
            Packet::Connected { .. }
        ));

        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        connect(&second, server_addr).await;
        match recv_packet(&second).await {
            Packet::Disconnected { reason } => assert!(reason.contains("full")),
            other => panic!("Expected refusal, got {:?}", other),
        }
    }
}
