//! Hi-Link Radar Wire Protocols
//!
//! This crate implements the two serial protocols spoken by the radar
//! level sensors, independent of any transport or timing source. Every
//! decoder is fed one byte at a time so partial UART deliveries decode
//! exactly like whole frames.
//!
//! # LD2413 (push)
//!
//! The sensor streams fixed-size data frames at its report cycle:
//! ```text
//! ┌─────────────┬────────┬──────────────┬─────────────┐
//! │ F4 F3 F2 F1 │ LEN=4  │ DISTANCE     │ F8 F7 F6 F5 │
//! │ 4B          │ u16 LE │ f32 LE (mm)  │ 4B          │
//! └─────────────┴────────┴──────────────┴─────────────┘
//! ```
//! Configuration uses command frames framed by `FD FC FB FA` / `04 03 02 01`.
//!
//! # LD8001H (request/response)
//!
//! Standard Modbus-RTU: read holding registers (0x03) and write single
//! register (0x06), protected by CRC-16/MODBUS.

#![no_std]
#![deny(unsafe_code)]

pub mod ld2413;
pub mod modbus;
mod sync;

pub use ld2413::{
    Ack, AckParser, Command, DataFrame, FrameDecoder, FrameError, DATA_FRAME_LEN,
};
pub use modbus::{crc16_modbus, ModbusError, Request, Response, ResponseParser};
