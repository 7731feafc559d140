//! Adapter for `embedded-io` serial ports
//!
//! Most chip HALs expose their buffered UARTs through `embedded-io`.
//! [`IoUart`] lets those ports be handed straight to the radar drivers.

use embedded_io::{Read, ReadReady, Write};

use crate::uart::{ErrorType, UartRx, UartTx};

/// Wraps an `embedded-io` port as a [`crate::Uart`]
pub struct IoUart<T> {
    inner: T,
}

impl<T> IoUart<T> {
    /// Wrap a port
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Release the wrapped port
    pub fn free(self) -> T {
        self.inner
    }
}

impl<T: embedded_io::ErrorType> ErrorType for IoUart<T> {
    type Error = T::Error;
}

impl<T: Read + ReadReady> UartRx for IoUart<T> {
    /// `embedded-io` only reports readiness, so this is `1` or `0`
    fn bytes_available(&mut self) -> usize {
        match self.inner.read_ready() {
            Ok(true) => 1,
            _ => 0,
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() || !self.inner.read_ready()? {
            return Ok(0);
        }
        self.inner.read(buf)
    }
}

impl<T: Write> UartTx for IoUart<T> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.inner.write_all(data)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush()
    }
}
