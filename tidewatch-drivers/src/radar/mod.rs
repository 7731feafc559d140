//! Radar level sensor drivers

pub mod ld2413;
pub mod ld8001h;
pub mod transform;

pub use ld2413::{Ld2413Driver, SetupStep};
pub use ld8001h::{Ld8001hDriver, SyncStep};
pub use transform::{AuxOffset, DepthBelowMount, MeasurementTransform, Passthrough};

/// Per-driver diagnostic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStats {
    /// Frames or responses that passed validation
    pub frames_decoded: u32,
    /// Frames discarded for length, marker or payload errors
    pub malformed_frames: u32,
    /// Partial frames abandoned after going quiet
    pub interbyte_timeouts: u32,
    /// Valid readings outside the accepted window
    pub out_of_range: u32,
    /// Requests that got no response in time
    pub exchange_timeouts: u32,
    /// Responses with a bad CRC
    pub crc_failures: u32,
    /// Responses with a structural error or an exception code
    pub protocol_errors: u32,
    /// Transport read or write failures
    pub link_errors: u32,
}

/// Increment a diagnostic counter
pub(crate) fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}
