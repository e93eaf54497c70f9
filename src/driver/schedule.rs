//! Deadline arithmetic for the fixed 20ms send cadence.

use tokio::time::{Duration, Instant};

/// Slot-based send schedule.
///
/// Deadlines are always computed from a fixed anchor (`anchor + slot * interval`),
/// so per-frame scheduling jitter never accumulates into drift.
#[derive(Clone, Debug)]
pub struct Schedule {
    anchor: Instant,
    interval: Duration,
    slot: u32,
    late_slots: u64,
}

impl Schedule {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            anchor: now,
            interval,
            slot: 0,
            late_slots: 0,
        }
    }

    /// The instant at which the current slot's frame should be sent.
    pub fn deadline(&self) -> Instant {
        self.anchor + self.interval * self.slot
    }

    /// Moves to the next slot.
    ///
    /// If that slot's deadline already lies a whole interval or more in the past,
    /// the missed slots are forfeited rather than sent in a burst.
    pub fn advance(&mut self, now: Instant) {
        self.slot += 1;

        let deadline = self.deadline();
        if now > deadline {
            let behind = now - deadline;
            let skipped = (behind.as_nanos() / self.interval.as_nanos().max(1)) as u32;

            if skipped > 0 {
                self.slot += skipped;
                self.late_slots += u64::from(skipped);
            }
        }
    }

    /// Restarts the schedule from `now`, with the first slot due immediately.
    pub fn reanchor(&mut self, now: Instant) {
        self.anchor = now;
        self.slot = 0;
    }

    /// Number of slots forfeited because frames were produced too late.
    pub fn late_slots(&self) -> u64 {
        self.late_slots
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
