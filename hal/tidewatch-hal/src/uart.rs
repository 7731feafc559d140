//! UART serial communication abstractions
//!
//! Provides non-blocking traits for serial communication that can be
//! implemented by chip-specific HALs. Reads never wait for data: they
//! return whatever the receive FIFO currently holds, which keeps a
//! cooperative polling loop from stalling on a silent sensor.

use core::fmt::Debug;

/// Error type shared by the receive and transmit halves
pub trait ErrorType {
    /// Error type for UART operations
    type Error: Debug;
}

/// UART receiver
pub trait UartRx: ErrorType {
    /// Number of bytes that can be read right now without waiting
    ///
    /// Implementations that can only report readiness may return a lower
    /// bound (e.g. `1` when anything is pending).
    fn bytes_available(&mut self) -> usize;

    /// Read up to `buf.len()` bytes that are already buffered
    ///
    /// Returns the number of bytes copied, which is `0` when nothing is
    /// pending. Never blocks.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Read a single byte if one is pending
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut buf = [0u8; 1];
        match self.read_available(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// Drop everything currently buffered on the receive side
    ///
    /// Returns the number of bytes discarded.
    fn discard_input(&mut self) -> Result<usize, Self::Error> {
        let mut scratch = [0u8; 32];
        let mut total = 0;
        loop {
            let n = self.read_available(&mut scratch)?;
            if n == 0 {
                return Ok(total);
            }
            total += n;
        }
    }
}

/// UART transmitter
pub trait UartTx: ErrorType {
    /// Queue all of `data` for transmission
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Combined UART interface
///
/// For UARTs that provide both TX and RX on a single peripheral.
pub trait Uart: UartTx + UartRx {}

// Blanket implementation
impl<T: UartTx + UartRx> Uart for T {}

/// UART configuration
///
/// Framing is fixed when the port is opened and is never negotiated
/// with the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl UartConfig {
    /// 8 data bits, no parity, 1 stop bit at the given baud rate
    pub const fn n81(baudrate: u32) -> Self {
        Self {
            baudrate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    One,
    Two,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockUart;

    #[test]
    fn test_default_is_115200_8n1() {
        assert_eq!(UartConfig::default(), UartConfig::n81(115200));
    }

    #[test]
    fn test_read_byte_empty() {
        let mut uart = MockUart::new();
        assert_eq!(uart.read_byte(), Ok(None));
    }

    #[test]
    fn test_discard_input_drains_everything() {
        let mut uart = MockUart::new();
        uart.push_rx(&[0xAB; 100]);
        assert_eq!(uart.discard_input(), Ok(100));
        assert_eq!(uart.bytes_available(), 0);
    }
}
