//! Sensor abstraction traits
//!
//! These traits define the interface between the polling loop and the
//! protocol-specific drivers.

pub mod sensor;

pub use sensor::{RangeSensor, TickOutcome};
