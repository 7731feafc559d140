//! Tidewatch Hardware Abstraction Layer
//!
//! This crate defines the transport-side traits the radar drivers are
//! written against. A board support crate implements them for its UART
//! peripheral; host tests use [`mock::MockUart`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  tidewatch-drivers (LD2413, LD8001H)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  tidewatch-hal (this crate - traits)    │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  board UART   │       │   MockUart    │
//! │ (embedded-io) │       │   (tests)     │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::UartRx`], [`uart::UartTx`] - Non-blocking serial I/O
//! - [`time::Clock`] - Monotonic millisecond clock

#![no_std]
#![deny(unsafe_code)]

#[cfg(feature = "embedded-io")]
pub mod io;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod time;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use time::Clock;
pub use uart::{ErrorType, Uart, UartConfig, UartRx, UartTx};
