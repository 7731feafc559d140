//! Cooperative poll loop
//!
//! Binds a [`RangeSensor`] to a clock and its polling schedule. The host
//! calls [`Poller::run_once`] from its main loop; each call either runs a
//! due tick or services the driver in between, and always returns
//! promptly.

use tidewatch_hal::time::Clock;

use super::interval::PollScheduler;
use crate::measurement::Measurement;
use crate::traits::{RangeSensor, TickOutcome};

/// Drives one sensor on its update interval
pub struct Poller<S, C> {
    sensor: S,
    clock: C,
    schedule: PollScheduler,
    ticks: u32,
}

impl<S: RangeSensor, C: Clock> Poller<S, C> {
    /// Create a poller using the sensor's configured interval
    pub fn new(sensor: S, clock: C) -> Self {
        let schedule = PollScheduler::new(sensor.update_interval_ms());
        Self {
            sensor,
            clock,
            schedule,
            ticks: 0,
        }
    }

    /// Run one loop iteration
    ///
    /// Returns the outcome of the tick or of the service call, if any.
    pub fn run_once(&mut self) -> Option<TickOutcome> {
        let now_ms = self.clock.now_ms();
        if self.schedule.poll(now_ms) {
            self.ticks = self.ticks.wrapping_add(1);
            Some(self.sensor.poll_tick(now_ms))
        } else {
            self.sensor.service(now_ms)
        }
    }

    /// Latest published measurement
    pub fn current(&self) -> Measurement {
        self.sensor.current()
    }

    /// Number of ticks fired so far
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Tear down the poller, returning the sensor and clock
    pub fn into_parts(self) -> (S, C) {
        (self.sensor, self.clock)
    }
}
