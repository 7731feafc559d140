//! Measurement publisher
//!
//! Holds the last known-good distance and tracks how many consecutive
//! cycles have passed without a fresh one.

/// Consecutive failed cycles before a measurement is marked stale
pub const DEFAULT_STALE_AFTER_CYCLES: u8 = 5;

/// Published distance measurement
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    /// Distance in millimeters
    pub distance_mm: f32,
    /// A value has been published at least once
    pub valid: bool,
    /// Timestamp of the last successful update (ms)
    pub updated_at_ms: u32,
    /// Not refreshed within the expected cadence
    pub stale: bool,
}

impl Measurement {
    /// Placeholder before the first successful decode
    pub const fn empty() -> Self {
        Self {
            distance_mm: 0.0,
            valid: false,
            updated_at_ms: 0,
            stale: false,
        }
    }

    /// Valid and fresh
    pub fn is_usable(&self) -> bool {
        self.valid && !self.stale
    }
}

impl Default for Measurement {
    fn default() -> Self {
        Self::empty()
    }
}

/// Last-value publisher with staleness tracking
#[derive(Debug, Clone)]
pub struct MeasurementPublisher {
    current: Measurement,
    missed_cycles: u8,
    stale_after_cycles: u8,
    updates: u32,
}

impl Default for MeasurementPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_CYCLES)
    }
}

impl MeasurementPublisher {
    /// Create a publisher that goes stale after `stale_after_cycles` misses
    ///
    /// Zero disables staleness tracking.
    pub const fn new(stale_after_cycles: u8) -> Self {
        Self {
            current: Measurement::empty(),
            missed_cycles: 0,
            stale_after_cycles,
            updates: 0,
        }
    }

    /// Publish a fresh value, clearing staleness
    pub fn publish(&mut self, distance_mm: f32, now_ms: u32) -> Measurement {
        self.current = Measurement {
            distance_mm,
            valid: true,
            updated_at_ms: now_ms,
            stale: false,
        };
        self.missed_cycles = 0;
        self.updates = self.updates.wrapping_add(1);
        self.current
    }

    /// Record a cycle that produced no value
    ///
    /// The published value is left unchanged. Returns true on the cycle
    /// the measurement becomes stale.
    pub fn record_miss(&mut self) -> bool {
        self.missed_cycles = self.missed_cycles.saturating_add(1);

        if self.stale_after_cycles == 0 || self.current.stale {
            return false;
        }

        if self.missed_cycles >= self.stale_after_cycles {
            self.current.stale = true;
            return true;
        }

        false
    }

    /// Most recent measurement
    pub fn current(&self) -> Measurement {
        self.current
    }

    /// Check if the current value is stale
    pub fn is_stale(&self) -> bool {
        self.current.stale
    }

    /// Consecutive cycles without a fresh value
    pub fn missed_cycles(&self) -> u8 {
        self.missed_cycles
    }

    /// Total successful publications
    pub fn updates(&self) -> u32 {
        self.updates
    }

    /// Drop the published value
    pub fn clear(&mut self) {
        self.current = Measurement::empty();
        self.missed_cycles = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_invalid() {
        let publisher = MeasurementPublisher::default();
        let m = publisher.current();
        assert!(!m.valid);
        assert!(!m.stale);
        assert!(!m.is_usable());
    }

    #[test]
    fn test_publish_updates_value() {
        let mut publisher = MeasurementPublisher::default();
        let m = publisher.publish(4200.0, 1234);
        assert_eq!(m.distance_mm, 4200.0);
        assert!(m.valid);
        assert_eq!(m.updated_at_ms, 1234);
        assert_eq!(publisher.updates(), 1);
    }

    #[test]
    fn test_goes_stale_after_threshold() {
        let mut publisher = MeasurementPublisher::new(3);
        publisher.publish(1000.0, 0);

        assert!(!publisher.record_miss());
        assert!(!publisher.record_miss());
        assert!(publisher.record_miss());
        assert!(publisher.is_stale());
        // Reported only once
        assert!(!publisher.record_miss());

        // Value itself is retained
        assert_eq!(publisher.current().distance_mm, 1000.0);
        assert!(publisher.current().valid);
    }

    #[test]
    fn test_publish_clears_staleness() {
        let mut publisher = MeasurementPublisher::new(1);
        publisher.publish(1000.0, 0);
        assert!(publisher.record_miss());

        publisher.publish(1100.0, 50);
        assert!(!publisher.is_stale());
        assert_eq!(publisher.missed_cycles(), 0);
    }

    #[test]
    fn test_zero_threshold_never_stale() {
        let mut publisher = MeasurementPublisher::new(0);
        for _ in 0..300 {
            assert!(!publisher.record_miss());
        }
        assert!(!publisher.is_stale());
        assert_eq!(publisher.missed_cycles(), u8::MAX);
    }

    #[test]
    fn test_clear() {
        let mut publisher = MeasurementPublisher::default();
        publisher.publish(1000.0, 0);
        publisher.clear();
        assert!(!publisher.current().valid);
    }
}
