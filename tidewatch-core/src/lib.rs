//! Board-agnostic core logic for the radar level drivers
//!
//! This crate contains everything that does not depend on a particular
//! sensor protocol or transport:
//!
//! - Device configuration types and the configuration guard
//! - Measurement publishing and staleness tracking
//! - Polling schedule and the cooperative poll loop
//! - The [`traits::RangeSensor`] interface implemented by each driver

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod measurement;
pub mod scheduler;
pub mod traits;

pub use config::{ConfigError, Ld2413Config, Ld8001hConfig, Validate};
pub use measurement::{Measurement, MeasurementPublisher};
pub use scheduler::{PollScheduler, Poller};
pub use traits::{RangeSensor, TickOutcome};
