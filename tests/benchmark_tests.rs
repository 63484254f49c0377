//! Performance benchmarks for critical simulation systems

use shared::{
    CollisionDetector, EntityId, EntityKind, EntitySpec, EntityUpdate, HistoryBuffer,
    InterpolationPlayback, Packet, Side, SimConfig, Snapshot, Timestamp, Vec2, World,
    MAX_UPDATES_PER_PACKET,
};
use std::time::Instant;

/// Benchmarks the swept segment-versus-polygon test
#[test]
fn benchmark_swept_collision_detection() {
    let mut world = World::new(SimConfig::default(), Side::Server).unwrap();
    let target = world.spawn(EntitySpec::new(EntityKind::Aircraft, Vec2::new(300.0, 500.0)));
    // Where a bullet fired from x=275 ends its first tick.
    let bullet = world.spawn(
        EntitySpec::new(EntityKind::Bullet, Vec2::new(294.2, 502.0))
            .with_velocity(Vec2::new(1200.0, 0.0)),
    );

    let detector = CollisionDetector::new(SimConfig::default().broad_phase_distance);
    let target = world.get(target).unwrap();
    let bullet = world.get(bullet).unwrap();
    let dt = SimConfig::default().tick_seconds();

    let iterations = 20_000;
    let start = Instant::now();

    let mut hits = 0;
    for _ in 0..iterations {
        if detector.detect(target, bullet, dt).hit {
            hits += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Swept collision: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(hits, iterations);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks history lookups used by lag compensation
#[test]
fn benchmark_history_lookup() {
    let mut history = HistoryBuffer::new(1000);
    for k in 0..=62 {
        let t = k * 16;
        history.enqueue(
            Snapshot::new(Vec2::new(t as f32, 500.0), Vec2::new(60.0, 0.0), 0.0, t),
            t,
        );
    }

    let iterations = 100_000u64;
    let start = Instant::now();

    let mut found = 0;
    for i in 0..iterations {
        if history.get_historical_state(i % 992).is_some() {
            found += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "History lookup: {} lookups in {:?} ({:.2} ns/lookup)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(found > 0);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks interpolation playback under a steady snapshot stream
#[test]
fn benchmark_playback_interpolation() {
    let playback = InterpolationPlayback::new(100, 32);

    let frames = 10_000u64;
    let start = Instant::now();

    for k in 0..frames {
        let t: Timestamp = k * 16;
        playback.enqueue(
            Snapshot::new(Vec2::new(k as f32, 500.0), Vec2::new(60.0, 0.0), 0.0, t),
            t + 30,
        );
        let _ = playback.get_interpolated_state(t + 30);
    }

    let duration = start.elapsed();
    println!(
        "Playback: {} frames in {:?} ({:.2} μs/frame)",
        frames,
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    let stats = playback.stats();
    assert_eq!(stats.received, frames);
    assert_eq!(stats.fast_forwards, 0);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks full server ticks with many aircraft and impactors in flight
#[test]
fn benchmark_world_step() {
    let mut world = World::new(SimConfig::default(), Side::Server).unwrap();
    for i in 0..100 {
        let x = -3000.0 + (i as f32) * 60.0;
        let aircraft = world.spawn(
            EntitySpec::new(EntityKind::Aircraft, Vec2::new(x, 1500.0))
                .with_velocity(Vec2::new(120.0, 0.0)),
        );
        world.spawn(
            EntitySpec::new(EntityKind::Bullet, Vec2::new(x, 1000.0))
                .with_velocity(Vec2::new(0.0, 900.0))
                .with_owner(aircraft),
        );
    }

    let ticks = 120u64;
    let start = Instant::now();

    let mut hits = 0;
    for k in 1..=ticks {
        let report = world.step(k * 16).unwrap();
        hits += report.hits.len();
    }

    let duration = start.elapsed();
    println!(
        "World step: {} entities x {} ticks in {:?} ({:.2} μs/tick), {} hits",
        200,
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64,
        hits
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks snapshot batch encoding at the largest batch size
#[test]
fn benchmark_packet_serialization() {
    let updates: Vec<EntityUpdate> = (0..MAX_UPDATES_PER_PACKET as u32)
        .map(|i| EntityUpdate {
            id: EntityId(i),
            snapshot: Snapshot::new(Vec2::new(i as f32, 100.0), Vec2::new(1.0, 0.0), 0.3, 480),
        })
        .collect();
    let packet = Packet::Snapshots {
        tick: 12345,
        timestamp: 197_520,
        updates,
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let encoded = packet.encode().unwrap();
        let _decoded = Packet::decode(&encoded).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}
