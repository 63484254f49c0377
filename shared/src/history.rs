//! Server-side pose history used to rewind a target for lag-compensated hits.

use crate::snapshot::Snapshot;
use crate::Timestamp;
use log::trace;
use std::collections::VecDeque;

/// Append-only, time-ordered record of one authoritative entity's poses.
///
/// Samples older than the retention window are pruned on every append.
/// Lookups never extrapolate: a time outside the retained range is a miss.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Snapshot>,
    retention_ms: Timestamp,
}

impl HistoryBuffer {
    pub fn new(retention_ms: Timestamp) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_ms,
        }
    }

    /// Appends `snapshot` keyed by `timestamp` and prunes samples older than
    /// `timestamp - retention`.
    ///
    /// Returns false and keeps the buffer unchanged when `timestamp` does not
    /// strictly follow the newest sample.
    pub fn enqueue(&mut self, snapshot: Snapshot, timestamp: Timestamp) -> bool {
        if let Some(newest) = self.samples.back() {
            if timestamp <= newest.timestamp {
                trace!(
                    "history rejected sample at {}ms (newest {}ms)",
                    timestamp,
                    newest.timestamp
                );
                return false;
            }
        }

        self.samples.push_back(Snapshot {
            timestamp,
            ..snapshot
        });

        let cutoff = timestamp.saturating_sub(self.retention_ms);
        while self
            .samples
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            self.samples.pop_front();
        }
        true
    }

    /// Pose at `timestamp`, interpolated between the two bracketing samples.
    pub fn get_historical_state(&self, timestamp: Timestamp) -> Option<Snapshot> {
        let oldest = self.samples.front()?;
        let newest = self.samples.back()?;
        if timestamp < oldest.timestamp || timestamp > newest.timestamp {
            return None;
        }

        // First sample strictly after the query; its predecessor brackets it.
        let after = self.samples.partition_point(|s| s.timestamp <= timestamp);
        if after == 0 {
            return None;
        }
        let before = &self.samples[after - 1];
        if before.timestamp == timestamp || after == self.samples.len() {
            return Some(*before);
        }

        let next = &self.samples[after];
        let t = before.fraction_towards(next, timestamp);
        Some(before.blend(next, t, timestamp))
    }

    pub fn oldest_timestamp(&self) -> Option<Timestamp> {
        self.samples.front().map(|s| s.timestamp)
    }

    pub fn newest_timestamp(&self) -> Option<Timestamp> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn retention_ms(&self) -> Timestamp {
        self.retention_ms
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::PI;

    fn sample(x: f32, rotation: f32, timestamp: Timestamp) -> Snapshot {
        Snapshot::new(Vec2::new(x, 0.0), Vec2::new(x * 2.0, 0.0), rotation, timestamp)
    }

    #[test]
    fn test_interpolates_between_bracketing_samples() {
        let mut history = HistoryBuffer::new(1000);
        history.enqueue(sample(0.0, 0.0, 100), 100);
        history.enqueue(sample(10.0, 0.0, 200), 200);

        let state = history.get_historical_state(125).unwrap();
        assert_approx_eq!(state.position.x, 2.5, 1e-5);
        assert_approx_eq!(state.velocity.x, 5.0, 1e-5);
        assert_eq!(state.timestamp, 125);
    }

    #[test]
    fn test_exact_sample_hits() {
        let mut history = HistoryBuffer::new(1000);
        history.enqueue(sample(0.0, 0.0, 100), 100);
        history.enqueue(sample(10.0, 0.0, 200), 200);

        assert_eq!(history.get_historical_state(100).unwrap().position.x, 0.0);
        assert_eq!(history.get_historical_state(200).unwrap().position.x, 10.0);
    }

    #[test]
    fn test_out_of_range_is_a_miss() {
        let mut history = HistoryBuffer::new(1000);
        assert!(history.get_historical_state(0).is_none());

        history.enqueue(sample(0.0, 0.0, 100), 100);
        history.enqueue(sample(10.0, 0.0, 200), 200);
        assert!(history.get_historical_state(99).is_none());
        assert!(history.get_historical_state(201).is_none());
    }

    #[test]
    fn test_prunes_beyond_retention() {
        let mut history = HistoryBuffer::new(100);
        for i in 0..=10 {
            history.enqueue(sample(i as f32, 0.0, i * 50), i * 50);
        }

        // newest 500, cutoff 400
        assert_eq!(history.oldest_timestamp(), Some(400));
        assert_eq!(history.len(), 3);
        assert!(history.get_historical_state(350).is_none());
        assert!(history.get_historical_state(420).is_some());
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let mut history = HistoryBuffer::new(1000);
        assert!(history.enqueue(sample(0.0, 0.0, 100), 100));
        assert!(!history.enqueue(sample(5.0, 0.0, 100), 100));
        assert!(!history.enqueue(sample(5.0, 0.0, 50), 50));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_rotation_wraps_the_short_way() {
        let mut history = HistoryBuffer::new(1000);
        history.enqueue(sample(0.0, PI - 0.2, 0), 0);
        history.enqueue(sample(0.0, -PI + 0.2, 100), 100);

        let state = history.get_historical_state(25).unwrap();
        assert_approx_eq!(state.rotation, PI - 0.1, 1e-4);
    }

    #[test]
    fn test_lookup_is_continuous_across_samples() {
        let mut history = HistoryBuffer::new(10_000);
        let xs = [0.0, 8.0, -3.0, 20.0, 21.0];
        for (i, x) in xs.iter().enumerate() {
            history.enqueue(sample(*x, 0.0, i as Timestamp * 100), i as Timestamp * 100);
        }

        let mut previous = history.get_historical_state(0).unwrap().position.x;
        for t in 1..=400 {
            let x = history.get_historical_state(t).unwrap().position.x;
            // Max slope is 23 units per 100ms.
            assert!((x - previous).abs() <= 0.23 + 1e-4, "jump at {}ms", t);
            previous = x;
        }
    }
}
