//! Distance measurements and their publication

pub mod publisher;

pub use publisher::{Measurement, MeasurementPublisher, DEFAULT_STALE_AFTER_CYCLES};
