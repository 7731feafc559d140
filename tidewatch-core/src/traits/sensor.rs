//! Range sensor trait

use crate::measurement::Measurement;

/// Result of one unit of driver work
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// A fresh distance was published (mm)
    Published(f32),
    /// A fresh value was published on the driver's secondary channel (mm)
    PublishedSecondary(f32),
    /// Nothing decodable arrived this cycle
    NoData,
    /// A reading was decoded but fell outside the accepted window
    Rejected,
    /// A request was sent and its response is pending
    Pending,
    /// The pending response did not arrive in time
    Timeout,
    /// The device is being configured, no measurement yet
    Configuring,
    /// The published value just became stale
    WentStale,
    /// The driver has been disabled
    Disabled,
}

impl TickOutcome {
    /// Check if this outcome carries a fresh value
    pub fn is_published(&self) -> bool {
        matches!(self, TickOutcome::Published(_))
    }
}

/// A polled distance sensor
///
/// The owner calls [`RangeSensor::poll_tick`] at the update interval and
/// [`RangeSensor::service`] as often as it likes in between. Neither call
/// may block.
pub trait RangeSensor {
    /// Handle a due polling tick
    fn poll_tick(&mut self, now_ms: u32) -> TickOutcome;

    /// Make progress between ticks
    ///
    /// Returns an outcome when something observable happened (a pending
    /// response arrived or timed out), `None` otherwise.
    fn service(&mut self, now_ms: u32) -> Option<TickOutcome>;

    /// Latest published measurement
    fn current(&self) -> Measurement;

    /// Polling interval this sensor was configured with (ms)
    fn update_interval_ms(&self) -> u32;
}
