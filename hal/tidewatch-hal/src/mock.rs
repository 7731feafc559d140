//! In-memory UART for host testing
//!
//! Bytes pushed with [`MockUart::push_rx`] are returned by reads; bytes
//! written by the driver are captured and can be inspected with
//! [`MockUart::take_tx`]. A disconnected port fails every operation.

use heapless::{Deque, Vec};

use crate::time::Clock;
use crate::uart::{ErrorType, UartRx, UartTx};

/// Receive queue capacity
pub const MOCK_RX_CAPACITY: usize = 1024;

/// Transmit capture capacity
pub const MOCK_TX_CAPACITY: usize = 512;

/// Errors reported by [`MockUart`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MockError {
    /// Port has been unplugged
    Disconnected,
    /// Transmit capture is full
    TxOverflow,
}

/// Scripted UART
#[derive(Debug, Default)]
pub struct MockUart {
    rx: Deque<u8, MOCK_RX_CAPACITY>,
    tx: Vec<u8, MOCK_TX_CAPACITY>,
    disconnected: bool,
    writes: u32,
}

impl MockUart {
    /// Create an empty, connected port
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the driver to read
    ///
    /// Bytes beyond the receive capacity are dropped, like a real FIFO
    /// overrun.
    pub fn push_rx(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.rx.push_back(b).is_err() {
                break;
            }
        }
    }

    /// Take everything the driver has written so far
    pub fn take_tx(&mut self) -> Vec<u8, MOCK_TX_CAPACITY> {
        core::mem::take(&mut self.tx)
    }

    /// Number of `write_all` calls since creation
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Simulate unplugging or re-plugging the cable
    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    /// Bytes still waiting to be read
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }
}

impl ErrorType for MockUart {
    type Error = MockError;
}

impl UartRx for MockUart {
    fn bytes_available(&mut self) -> usize {
        if self.disconnected {
            0
        } else {
            self.rx.len()
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.disconnected {
            return Err(MockError::Disconnected);
        }
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl UartTx for MockUart {
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        if self.disconnected {
            return Err(MockError::Disconnected);
        }
        self.writes += 1;
        self.tx
            .extend_from_slice(data)
            .map_err(|_| MockError::TxOverflow)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.disconnected {
            Err(MockError::Disconnected)
        } else {
            Ok(())
        }
    }
}

/// Manually advanced clock
#[derive(Debug, Default, Clone, Copy)]
pub struct MockClock {
    now_ms: u32,
}

impl MockClock {
    /// Create a clock starting at `start_ms`
    pub const fn starting_at(start_ms: u32) -> Self {
        Self { now_ms: start_ms }
    }

    /// Move time forward
    pub fn advance(&mut self, delta_ms: u32) {
        self.now_ms = self.now_ms.wrapping_add(delta_ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }
}
