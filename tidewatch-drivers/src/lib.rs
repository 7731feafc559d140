//! Radar level sensor drivers
//!
//! This crate provides concrete implementations of the
//! [`RangeSensor`](tidewatch_core::traits::RangeSensor) trait for the
//! Hi-Link radar modules:
//!
//! - LD2413: streaming distance frames plus a one-time command setup
//! - LD8001H: Modbus-RTU polling with register sync
//!
//! Drivers own their UART through [`transport::SerialLink`] and never
//! block; the host drives them from a [`Poller`](tidewatch_core::scheduler::Poller)
//! or its own loop.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod radar;
pub mod transport;

pub use radar::{
    AuxOffset, DepthBelowMount, DriverStats, Ld2413Driver, Ld8001hDriver, MeasurementTransform,
    Passthrough, SetupStep, SyncStep,
};
