//! Fixed-interval polling schedule

use tidewatch_hal::time::deadline_reached;

/// Decides when the next polling tick is due
///
/// The first call to [`PollScheduler::poll`] always fires. After that,
/// ticks keep a fixed cadence; if the caller falls more than one interval
/// behind, the schedule restarts from the current time instead of
/// firing a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    interval_ms: u32,
    next_due_ms: Option<u32>,
}

impl PollScheduler {
    /// Create a schedule firing every `interval_ms`
    ///
    /// An interval of zero fires on every call.
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            next_due_ms: None,
        }
    }

    /// Configured interval (ms)
    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// Check whether a tick is due without consuming it
    pub fn is_due(&self, now_ms: u32) -> bool {
        match self.next_due_ms {
            None => true,
            Some(due) => deadline_reached(now_ms, due),
        }
    }

    /// Consume a due tick
    ///
    /// Returns true if the caller should run its tick now.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if !self.is_due(now_ms) {
            return false;
        }

        let next = match self.next_due_ms {
            Some(due) => due.wrapping_add(self.interval_ms),
            None => now_ms.wrapping_add(self.interval_ms),
        };
        self.next_due_ms = if deadline_reached(now_ms, next) && self.interval_ms > 0 {
            // Fell behind by a whole interval
            Some(now_ms.wrapping_add(self.interval_ms))
        } else {
            Some(next)
        };
        true
    }

    /// Time until the next tick (ms), zero when due
    pub fn remaining_ms(&self, now_ms: u32) -> u32 {
        match self.next_due_ms {
            Some(due) if !deadline_reached(now_ms, due) => due.wrapping_sub(now_ms),
            _ => 0,
        }
    }

    /// Fire on the next call again
    pub fn reset(&mut self) {
        self.next_due_ms = None;
    }
}
