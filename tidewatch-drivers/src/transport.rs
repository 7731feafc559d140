//! Serial transport adapter
//!
//! Wraps a [`Uart`] so the drivers never see a transport error: failed
//! reads look like "nothing available" and failed writes are reported as
//! a plain `false`. Both are counted for diagnostics.

use core::fmt::Write as _;

use heapless::String;
use tidewatch_hal::{Uart, UartConfig};

/// Largest single read from the port
pub const READ_CHUNK: usize = 64;

/// Receive backlog that triggers a warning
pub const BACKLOG_WARN_BYTES: usize = 256;

/// Bytes shown by [`dump_bytes`]
pub const DUMP_LIMIT: usize = 64;

/// Non-failing view of a serial port
pub struct SerialLink<U> {
    uart: U,
    link_errors: u32,
    rx_bytes: u32,
}

impl<U: Uart> SerialLink<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            link_errors: 0,
            rx_bytes: 0,
        }
    }

    /// Bytes that can be read without waiting
    pub fn bytes_available(&mut self) -> usize {
        self.uart.bytes_available()
    }

    /// Read whatever is pending into `buf`
    ///
    /// A read error is counted and reported as zero bytes.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        match self.uart.read_available(buf) {
            Ok(n) => {
                self.rx_bytes = self.rx_bytes.wrapping_add(n as u32);
                n
            }
            Err(_) => {
                self.link_errors = self.link_errors.wrapping_add(1);
                debug!("uart read failed, treating as no data");
                0
            }
        }
    }

    /// Write and flush a complete frame
    pub fn send(&mut self, data: &[u8]) -> bool {
        let result = self.uart.write_all(data).and_then(|()| self.uart.flush());
        if result.is_err() {
            self.link_errors = self.link_errors.wrapping_add(1);
            warn!("uart write of {} bytes failed", data.len());
            return false;
        }
        trace!("tx {} bytes", data.len());
        true
    }

    /// Drop stale input before starting an exchange
    pub fn discard_input(&mut self) -> usize {
        match self.uart.discard_input() {
            Ok(n) => n,
            Err(_) => {
                self.link_errors = self.link_errors.wrapping_add(1);
                0
            }
        }
    }

    /// Read or write failures so far
    pub fn link_errors(&self) -> u32 {
        self.link_errors
    }

    /// Total bytes received
    pub fn rx_bytes(&self) -> u32 {
        self.rx_bytes
    }

    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// Give the port back
    pub fn release(self) -> U {
        self.uart
    }
}

/// Compare a port's framing with what a device requires
///
/// Logs a warning per mismatching parameter. Returns true on a match.
pub fn check_uart_config(device: &str, required: &UartConfig, actual: &UartConfig) -> bool {
    let mut ok = true;
    if required.baudrate != actual.baudrate {
        warn!(
            "{}: baud rate is {}, device requires {}",
            device, actual.baudrate, required.baudrate
        );
        ok = false;
    }
    if required.data_bits != actual.data_bits {
        warn!(
            "{}: data bits are {:?}, device requires {:?}",
            device, actual.data_bits, required.data_bits
        );
        ok = false;
    }
    if required.parity != actual.parity {
        warn!(
            "{}: parity is {:?}, device requires {:?}",
            device, actual.parity, required.parity
        );
        ok = false;
    }
    if required.stop_bits != actual.stop_bits {
        warn!(
            "{}: stop bits are {:?}, device requires {:?}",
            device, actual.stop_bits, required.stop_bits
        );
        ok = false;
    }
    ok
}

/// Render up to [`DUMP_LIMIT`] bytes as hex
pub fn hex_string(bytes: &[u8]) -> String<{ DUMP_LIMIT * 3 }> {
    let mut out = String::new();
    for (i, b) in bytes.iter().take(DUMP_LIMIT).enumerate() {
        let sep = if i == 0 { "" } else { " " };
        let _ = write!(out, "{}{:02X}", sep, b);
    }
    out
}

/// Log a hex dump of received bytes at debug level
pub fn dump_bytes(device: &str, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let shown = bytes.len().min(DUMP_LIMIT);
    let hex = hex_string(bytes);
    debug!(
        "{}: {} unconsumed bytes (showing {}): {}",
        device,
        bytes.len(),
        shown,
        hex.as_str()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewatch_hal::mock::MockUart;
    use tidewatch_hal::uart::Parity;

    #[test]
    fn test_read_error_is_no_data() {
        let mut uart = MockUart::new();
        uart.push_rx(&[1, 2, 3]);
        uart.set_disconnected(true);
        let mut link = SerialLink::new(uart);

        let mut buf = [0u8; READ_CHUNK];
        assert_eq!(link.read_chunk(&mut buf), 0);
        assert_eq!(link.link_errors(), 1);

        link.uart_mut().set_disconnected(false);
        assert_eq!(link.read_chunk(&mut buf), 3);
        assert_eq!(link.rx_bytes(), 3);
    }

    #[test]
    fn test_send_failure_counted() {
        let mut uart = MockUart::new();
        uart.set_disconnected(true);
        let mut link = SerialLink::new(uart);
        assert!(!link.send(&[0xAA]));
        assert_eq!(link.link_errors(), 1);
    }

    #[test]
    fn test_send_captured() {
        let mut link = SerialLink::new(MockUart::new());
        assert!(link.send(&[0x01, 0x02]));
        let mut uart = link.release();
        assert_eq!(uart.take_tx().as_slice(), &[0x01, 0x02]);
    }

    #[test]
    fn test_uart_config_check() {
        let required = UartConfig::n81(115200);
        assert!(check_uart_config("test", &required, &UartConfig::n81(115200)));
        assert!(!check_uart_config("test", &required, &UartConfig::n81(9600)));

        let even = UartConfig {
            parity: Parity::Even,
            ..required
        };
        assert!(!check_uart_config("test", &required, &even));
    }

    #[test]
    fn test_hex_string_limited() {
        assert_eq!(hex_string(&[0xF4, 0x03, 0x00]).as_str(), "F4 03 00");
        let long = [0xABu8; 100];
        let hex = hex_string(&long);
        assert_eq!(hex.len(), DUMP_LIMIT * 3 - 1);
    }
}
