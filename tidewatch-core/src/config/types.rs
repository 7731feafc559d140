//! Device configuration types
//!
//! A configuration is built once, checked by [`Validate::validate`], and
//! then handed to a driver constructor. Drivers never mutate it.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::measurement::DEFAULT_STALE_AFTER_CYCLES;

/// Shortest report cycle the LD2413 accepts (ms)
pub const MIN_REPORT_CYCLE_MS: u16 = 50;

/// Longest report cycle the LD2413 accepts (ms)
pub const MAX_REPORT_CYCLE_MS: u16 = 1000;

/// Lower bound for installation height and range (mm)
pub const MIN_SPAN_MM: u32 = 150;

/// Upper bound for installation height and range (mm)
pub const MAX_SPAN_MM: u32 = 40_000;

/// Lowest assignable Modbus slave address
pub const MIN_MODBUS_ADDRESS: u8 = 0x01;

/// Highest assignable Modbus slave address
pub const MAX_MODBUS_ADDRESS: u8 = 0xFD;

/// Configuration invariant violations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `min_distance` is not strictly below `max_distance`
    DistanceBoundsInverted { min_mm: u16, max_mm: u16 },
    /// `report_cycle` outside [50, 1000] ms
    ReportCycleOutOfRange { cycle_ms: u16 },
    /// `installation_height` outside [150, 40000] mm
    InstallationHeightOutOfRange { height_mm: u32 },
    /// `range` outside [150, 40000] mm
    RangeOutOfRange { range_mm: u32 },
    /// `modbus_address` outside [0x01, 0xFD]
    ModbusAddressOutOfRange { address: u8 },
    /// `response_timeout` of zero leaves no time for a reply
    ResponseTimeoutZero,
    /// `update_interval` does not leave room for the response wait
    UpdateIntervalTooShort { interval_ms: u32, timeout_ms: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DistanceBoundsInverted { min_mm, max_mm } => write!(
                f,
                "min_distance ({} mm) must be less than max_distance ({} mm)",
                min_mm, max_mm
            ),
            Self::ReportCycleOutOfRange { cycle_ms } => write!(
                f,
                "report_cycle ({} ms) must be within [{}, {}] ms",
                cycle_ms, MIN_REPORT_CYCLE_MS, MAX_REPORT_CYCLE_MS
            ),
            Self::InstallationHeightOutOfRange { height_mm } => write!(
                f,
                "installation_height ({} mm) must be within [{}, {}] mm",
                height_mm, MIN_SPAN_MM, MAX_SPAN_MM
            ),
            Self::RangeOutOfRange { range_mm } => write!(
                f,
                "range ({} mm) must be within [{}, {}] mm",
                range_mm, MIN_SPAN_MM, MAX_SPAN_MM
            ),
            Self::ModbusAddressOutOfRange { address } => write!(
                f,
                "modbus_address (0x{:02X}) must be within [0x{:02X}, 0x{:02X}]",
                address, MIN_MODBUS_ADDRESS, MAX_MODBUS_ADDRESS
            ),
            Self::ResponseTimeoutZero => write!(f, "response_timeout must be greater than 0 ms"),
            Self::UpdateIntervalTooShort {
                interval_ms,
                timeout_ms,
            } => write!(
                f,
                "update_interval ({} ms) must be longer than response_timeout ({} ms)",
                interval_ms, timeout_ms
            ),
        }
    }
}

/// Configuration guard
///
/// Pure check run before a driver is armed. The first violated
/// invariant is reported.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// LD2413 configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Ld2413Config {
    /// Host polling interval (ms)
    pub update_interval_ms: u32,
    /// Shortest distance reported as valid (mm)
    pub min_distance_mm: u16,
    /// Longest distance reported as valid (mm)
    pub max_distance_mm: u16,
    /// Device-side frame emission interval (ms)
    pub report_cycle_ms: u16,
    /// Recalibrate the detection threshold during setup
    pub calibrate_on_boot: bool,
    /// Consecutive empty cycles before the value is marked stale (0 = never)
    pub stale_after_cycles: u8,
}

impl Default for Ld2413Config {
    fn default() -> Self {
        Self {
            update_interval_ms: 1000,
            min_distance_mm: 150,
            max_distance_mm: 10_500,
            report_cycle_ms: 160,
            calibrate_on_boot: false,
            stale_after_cycles: DEFAULT_STALE_AFTER_CYCLES,
        }
    }
}

impl Validate for Ld2413Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_distance_mm >= self.max_distance_mm {
            return Err(ConfigError::DistanceBoundsInverted {
                min_mm: self.min_distance_mm,
                max_mm: self.max_distance_mm,
            });
        }

        if !(MIN_REPORT_CYCLE_MS..=MAX_REPORT_CYCLE_MS).contains(&self.report_cycle_ms) {
            return Err(ConfigError::ReportCycleOutOfRange {
                cycle_ms: self.report_cycle_ms,
            });
        }

        Ok(())
    }
}

impl Ld2413Config {
    /// Check whether a decoded distance lies inside the configured window
    pub fn accepts(&self, distance_mm: f32) -> bool {
        distance_mm >= f32::from(self.min_distance_mm)
            && distance_mm <= f32::from(self.max_distance_mm)
    }
}

/// LD8001H configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Ld8001hConfig {
    /// Host polling interval (ms)
    pub update_interval_ms: u32,
    /// Mounting height above the bottom (cm), enables depth readings
    pub installation_height_cm: Option<u16>,
    /// Measuring range (m)
    pub range_m: u16,
    /// Modbus slave address
    pub modbus_address: u8,
    /// Also read the device's water-level register
    pub water_level_readout: bool,
    /// Bounded wait for a Modbus response (ms)
    pub response_timeout_ms: u32,
    /// Consecutive failed cycles before the value is marked stale (0 = never)
    pub stale_after_cycles: u8,
}

impl Default for Ld8001hConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 2000,
            installation_height_cm: None,
            range_m: 10,
            modbus_address: 0x01,
            water_level_readout: false,
            response_timeout_ms: 100,
            stale_after_cycles: DEFAULT_STALE_AFTER_CYCLES,
        }
    }
}

impl Validate for Ld8001hConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(height_mm) = self.installation_height_mm() {
            if !(MIN_SPAN_MM..=MAX_SPAN_MM).contains(&height_mm) {
                return Err(ConfigError::InstallationHeightOutOfRange { height_mm });
            }
        }

        let range_mm = self.range_mm();
        if !(MIN_SPAN_MM..=MAX_SPAN_MM).contains(&range_mm) {
            return Err(ConfigError::RangeOutOfRange { range_mm });
        }

        if !(MIN_MODBUS_ADDRESS..=MAX_MODBUS_ADDRESS).contains(&self.modbus_address) {
            return Err(ConfigError::ModbusAddressOutOfRange {
                address: self.modbus_address,
            });
        }

        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ResponseTimeoutZero);
        }

        // Every tick must leave the previous exchange its full wait
        if self.update_interval_ms <= self.response_timeout_ms {
            return Err(ConfigError::UpdateIntervalTooShort {
                interval_ms: self.update_interval_ms,
                timeout_ms: self.response_timeout_ms,
            });
        }

        Ok(())
    }
}

impl Ld8001hConfig {
    /// Installation height in millimeters
    pub fn installation_height_mm(&self) -> Option<u32> {
        self.installation_height_cm.map(|cm| u32::from(cm) * 10)
    }

    /// Measuring range in millimeters
    pub fn range_mm(&self) -> u32 {
        u32::from(self.range_m) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use heapless::String;
    use proptest::prelude::*;

    fn message(err: ConfigError) -> String<128> {
        let mut out = String::new();
        write!(out, "{}", err).unwrap();
        out
    }

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(Ld2413Config::default().validate(), Ok(()));
        assert_eq!(Ld8001hConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_ld2413_scenario_accepted() {
        let config = Ld2413Config {
            min_distance_mm: 150,
            max_distance_mm: 10_500,
            report_cycle_ms: 160,
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = Ld2413Config {
            min_distance_mm: 5000,
            max_distance_mm: 1000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::DistanceBoundsInverted {
                min_mm: 5000,
                max_mm: 1000
            }
        );
        assert!(message(err).contains("min_distance"));
    }

    #[test]
    fn test_equal_bounds_rejected() {
        let config = Ld2413Config {
            min_distance_mm: 1000,
            max_distance_mm: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DistanceBoundsInverted { .. })
        ));
    }

    #[test]
    fn test_report_cycle_limits() {
        for (cycle, ok) in [(49, false), (50, true), (1000, true), (1001, false)] {
            let config = Ld2413Config {
                report_cycle_ms: cycle,
                ..Default::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "cycle {}", cycle);
        }
        let err = Ld2413Config {
            report_cycle_ms: 20,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(message(err).contains("report_cycle"));
    }

    #[test]
    fn test_installation_height_limits() {
        // 14 cm = 140 mm, too low
        let low = Ld8001hConfig {
            installation_height_cm: Some(14),
            ..Default::default()
        };
        assert_eq!(
            low.validate(),
            Err(ConfigError::InstallationHeightOutOfRange { height_mm: 140 })
        );
        assert!(message(low.validate().unwrap_err()).contains("installation_height"));

        let edge = Ld8001hConfig {
            installation_height_cm: Some(4000),
            ..Default::default()
        };
        assert_eq!(edge.validate(), Ok(()));

        let high = Ld8001hConfig {
            installation_height_cm: Some(4001),
            ..Default::default()
        };
        assert!(high.validate().is_err());
    }

    #[test]
    fn test_range_limits() {
        let zero = Ld8001hConfig {
            range_m: 0,
            ..Default::default()
        };
        assert_eq!(
            zero.validate(),
            Err(ConfigError::RangeOutOfRange { range_mm: 0 })
        );
        assert!(message(zero.validate().unwrap_err()).contains("range"));

        let max = Ld8001hConfig {
            range_m: 40,
            ..Default::default()
        };
        assert_eq!(max.validate(), Ok(()));

        let over = Ld8001hConfig {
            range_m: 41,
            ..Default::default()
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_modbus_address_limits() {
        for (address, ok) in [(0x00, false), (0x01, true), (0xFD, true), (0xFE, false)] {
            let config = Ld8001hConfig {
                modbus_address: address,
                ..Default::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "address {:#x}", address);
        }
        let err = Ld8001hConfig {
            modbus_address: 0xFF,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert!(message(err).contains("modbus_address"));
    }

    #[test]
    fn test_zero_response_timeout_rejected() {
        let config = Ld8001hConfig {
            response_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ResponseTimeoutZero));
        assert!(message(ConfigError::ResponseTimeoutZero).contains("response_timeout"));
    }

    #[test]
    fn test_update_interval_must_exceed_response_timeout() {
        for (interval, ok) in [(0, false), (50, false), (100, false), (101, true), (2000, true)] {
            let config = Ld8001hConfig {
                update_interval_ms: interval,
                response_timeout_ms: 100,
                ..Default::default()
            };
            assert_eq!(config.validate().is_ok(), ok, "interval {}", interval);
        }
        let err = Ld8001hConfig {
            update_interval_ms: 0,
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UpdateIntervalTooShort {
                interval_ms: 0,
                timeout_ms: 100
            }
        );
        assert!(message(err).contains("update_interval"));
    }

    #[test]
    fn test_accepts_window() {
        let config = Ld2413Config::default();
        assert!(config.accepts(150.0));
        assert!(config.accepts(4200.0));
        assert!(config.accepts(10_500.0));
        assert!(!config.accepts(149.9));
        assert!(!config.accepts(10_500.5));
    }

    proptest! {
        #[test]
        fn prop_ld2413_guard_accepts_valid(
            min in 0u16..u16::MAX,
            span in 1u16..=u16::MAX,
            cycle in MIN_REPORT_CYCLE_MS..=MAX_REPORT_CYCLE_MS,
        ) {
            let config = Ld2413Config {
                min_distance_mm: min,
                max_distance_mm: min.saturating_add(span).max(min + 1),
                report_cycle_ms: cycle,
                ..Default::default()
            };
            prop_assert_eq!(config.validate(), Ok(()));
        }

        #[test]
        fn prop_ld8001h_guard_accepts_valid(
            height_cm in proptest::option::of(15u16..=4000),
            range_m in 1u16..=40,
            address in MIN_MODBUS_ADDRESS..=MAX_MODBUS_ADDRESS,
            timeout_ms in 1u32..1000,
            slack_ms in 1u32..10_000,
        ) {
            let config = Ld8001hConfig {
                installation_height_cm: height_cm,
                range_m,
                modbus_address: address,
                response_timeout_ms: timeout_ms,
                update_interval_ms: timeout_ms + slack_ms,
                ..Default::default()
            };
            prop_assert_eq!(config.validate(), Ok(()));
        }

        #[test]
        fn prop_single_violation_named(address in prop_oneof![Just(0u8), 0xFEu8..=0xFF]) {
            let config = Ld8001hConfig {
                modbus_address: address,
                ..Default::default()
            };
            prop_assert_eq!(
                config.validate(),
                Err(ConfigError::ModbusAddressOutOfRange { address })
            );
        }
    }
}
