//! Dispatcher liveness instrumentation.
//!
//! When a heartbeat period is configured the dispatcher wakes at least once
//! per period, even with nothing queued, and records a beat. Watching
//! `beat_count` advance tells a supervisor the dispatcher is alive.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot of dispatcher liveness counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Number of heartbeat ticks since start.
    pub beat_count: u64,
    /// Number of envelopes handed to the bus.
    pub events_dispatched: u64,
    /// When the last heartbeat tick happened.
    pub last_beat: Option<Instant>,
}

impl HeartbeatStats {
    /// Time since the last beat, if there has been one
    pub fn since_last_beat(&self) -> Option<Duration> {
        self.last_beat.map(|beat| beat.elapsed())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    beat_count: AtomicU64,
    events_dispatched: AtomicU64,
    last_beat: Mutex<Option<Instant>>,
}

impl Heartbeat {
    pub(crate) fn tick(&self) {
        *self.last_beat.lock() = Some(Instant::now());
        self.beat_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_dispatch(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            beat_count: self.beat_count.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            last_beat: *self.last_beat.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let heartbeat = Heartbeat::default();
        assert_eq!(heartbeat.stats().last_beat, None);
        assert_eq!(heartbeat.stats().since_last_beat(), None);

        heartbeat.tick();
        heartbeat.tick();
        heartbeat.on_dispatch();

        let stats = heartbeat.stats();
        assert_eq!(stats.beat_count, 2);
        assert_eq!(stats.events_dispatched, 1);
        assert!(stats.since_last_beat().is_some());
    }
}
