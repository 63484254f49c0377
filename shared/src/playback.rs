//! Client-side smoothing of remotely simulated entities.
//!
//! Snapshots arrive from a network receive task while the update loop reads
//! interpolated poses, so the buffer is internally locked and shared as an
//! `Arc<InterpolationPlayback>`.

use crate::snapshot::Snapshot;
use crate::Timestamp;
use log::{debug, trace};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle of one mirrored entity's playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing received yet.
    Empty,
    /// One sample received, waiting for a second to blend toward.
    Buffering,
    /// Blending between two samples.
    Playing,
    /// Playback caught up with the newest sample and is holding it.
    Starved,
}

/// Diagnostic counters. None of these are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub received: u64,
    /// Stale or duplicate snapshots dropped at the buffer boundary.
    pub discarded: u64,
    /// Reads that held the last pose because no newer sample existed.
    pub starved_reads: u64,
    /// Times the queue overflowed and stale samples were dropped.
    pub fast_forwards: u64,
}

#[derive(Debug, Clone, Copy)]
struct QueuedSnapshot {
    snapshot: Snapshot,
    arrival: Timestamp,
}

#[derive(Debug)]
struct PlaybackInner {
    queue: VecDeque<QueuedSnapshot>,
    from: Option<Snapshot>,
    to: Option<Snapshot>,
    newest: Option<Timestamp>,
    /// Smallest observed `arrival - sender timestamp`; maps local time onto
    /// the sender's clock.
    clock_offset: Option<i64>,
    cursor: Timestamp,
    state: PlaybackState,
    stats: PlaybackStats,
}

#[derive(Debug)]
pub struct InterpolationPlayback {
    inner: Mutex<PlaybackInner>,
    buffer_ms: Timestamp,
    max_depth: usize,
}

impl InterpolationPlayback {
    pub fn new(buffer_ms: Timestamp, max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(PlaybackInner {
                queue: VecDeque::with_capacity(max_depth + 1),
                from: None,
                to: None,
                newest: None,
                clock_offset: None,
                cursor: 0,
                state: PlaybackState::Empty,
                stats: PlaybackStats::default(),
            }),
            buffer_ms,
            max_depth: max_depth.max(2),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackInner> {
        // A panicking reader cannot leave the queue half-written, so the
        // data is still usable after poisoning.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a remote snapshot keyed by its sender timestamp.
    ///
    /// `arrival` is the local receive time. Snapshots not newer than the
    /// newest accepted one are discarded and `false` is returned.
    pub fn enqueue(&self, snapshot: Snapshot, arrival: Timestamp) -> bool {
        let mut inner = self.lock();

        if inner.newest.is_some_and(|newest| snapshot.timestamp <= newest) {
            inner.stats.discarded += 1;
            trace!(
                "discarding stale snapshot at {}ms (newest {:?})",
                snapshot.timestamp,
                inner.newest
            );
            return false;
        }

        inner.newest = Some(snapshot.timestamp);
        inner.stats.received += 1;

        let offset = arrival as i64 - snapshot.timestamp as i64;
        inner.clock_offset = Some(match inner.clock_offset {
            Some(current) => current.min(offset),
            None => offset,
        });

        inner.queue.push_back(QueuedSnapshot { snapshot, arrival });

        if inner.queue.len() > self.max_depth {
            if let Some(latest) = inner.queue.pop_back() {
                let dropped = inner.queue.len();
                inner.queue.clear();
                inner.queue.push_back(latest);
                inner.stats.fast_forwards += 1;
                debug!(
                    "playback backlog of {} samples dropped, keeping {}ms (arrived {}ms)",
                    dropped, latest.snapshot.timestamp, latest.arrival
                );
            }
        }

        inner.state = match (inner.from, inner.to) {
            (None, None) if inner.queue.len() == 1 => PlaybackState::Buffering,
            _ => PlaybackState::Playing,
        };
        true
    }

    /// Pose to display at local time `now`, or `None` before any sample.
    ///
    /// Runs `buffer_ms` behind the sender's clock, blends between the two
    /// samples bracketing the playback cursor, and holds the newest sample
    /// when the queue runs dry.
    pub fn get_interpolated_state(&self, now: Timestamp) -> Option<Snapshot> {
        let mut inner = self.lock();
        let offset = inner.clock_offset?;

        let target = (now as i64 - offset - self.buffer_ms as i64).max(0) as Timestamp;
        inner.cursor = inner.cursor.max(target);
        let cursor = inner.cursor;

        if inner.to.is_none() {
            inner.to = inner.queue.pop_front().map(|q| q.snapshot);
        }
        while !inner.queue.is_empty() && inner.to.is_some_and(|to| to.timestamp <= cursor) {
            inner.from = inner.to;
            inner.to = inner.queue.pop_front().map(|q| q.snapshot);
        }

        match (inner.from, inner.to) {
            (Some(from), Some(to)) => {
                if cursor >= to.timestamp {
                    inner.stats.starved_reads += 1;
                    if inner.state != PlaybackState::Starved {
                        trace!("playback starved at {}ms", to.timestamp);
                    }
                    inner.state = PlaybackState::Starved;
                    Some(to)
                } else {
                    inner.state = PlaybackState::Playing;
                    let t = from.fraction_towards(&to, cursor);
                    Some(from.blend(&to, t, cursor))
                }
            }
            (None, Some(to)) => {
                inner.state = if inner.queue.is_empty() {
                    PlaybackState::Buffering
                } else {
                    PlaybackState::Playing
                };
                Some(to)
            }
            _ => None,
        }
    }

    /// Current playback time on the sender's clock for local time `now`,
    /// without advancing the buffer. Stamped onto outgoing attacks so the
    /// authority can rewind to what this side was displaying.
    pub fn view_timestamp(&self, now: Timestamp) -> Option<Timestamp> {
        let inner = self.lock();
        let offset = inner.clock_offset?;
        let target = (now as i64 - offset - self.buffer_ms as i64).max(0) as Timestamp;
        Some(inner.cursor.max(target))
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state
    }

    pub fn stats(&self) -> PlaybackStats {
        self.lock().stats
    }

    /// Samples queued and not yet blended.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn buffer_ms(&self) -> Timestamp {
        self.buffer_ms
    }
}
