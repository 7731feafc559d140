//! Modbus-RTU subset used by the LD8001H
//!
//! Only the two functions the sensor needs are implemented: read holding
//! registers (0x03) and write single register (0x06). Requests are always
//! 8 bytes. Responses are parsed incrementally by [`ResponseParser`], which
//! knows the expected length from the request it answers.
//!
//! ```text
//! Read request:   ADDR | 03 | REG_HI REG_LO | CNT_HI CNT_LO | CRC_LO CRC_HI
//! Read response:  ADDR | 03 | BYTES | DATA (BYTES) | CRC_LO CRC_HI
//! Write request:  ADDR | 06 | REG_HI REG_LO | VAL_HI VAL_LO | CRC_LO CRC_HI
//! Write response: echo of the request
//! Exception:      ADDR | FN|80 | CODE | CRC_LO CRC_HI
//! ```

use heapless::Vec;

/// Read holding registers
pub const FN_READ_HOLDING: u8 = 0x03;

/// Write single register
pub const FN_WRITE_SINGLE: u8 = 0x06;

/// Set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Every request is this long
pub const REQUEST_LEN: usize = 8;

/// Largest register count a single read may ask for
pub const MAX_READ_REGISTERS: usize = 4;

/// Largest response the parser accepts
pub const MAX_RESPONSE_LEN: usize = 3 + 2 * MAX_READ_REGISTERS + 2;

/// Exception response length
pub const EXCEPTION_LEN: usize = 5;

/// Lowest assignable slave address
pub const MIN_SLAVE_ADDRESS: u8 = 0x01;

/// Highest assignable slave address
pub const MAX_SLAVE_ADDRESS: u8 = 0xFD;

/// LD8001H holding registers
pub mod reg {
    /// Distance from the antenna to the surface (mm)
    pub const SPACE_HEIGHT: u16 = 0x0001;
    /// Installation height minus space height (mm)
    pub const WATER_LEVEL: u16 = 0x0003;
    /// Mounting height above the bottom (cm)
    pub const INSTALLATION_HEIGHT: u16 = 0x0005;
    /// Slave address
    pub const DEVICE_ADDRESS: u16 = 0x03F4;
    /// Baud rate code
    pub const BAUD_RATE: u16 = 0x03F6;
    /// Measuring range (m)
    pub const RANGE: u16 = 0x07D4;
}

/// CRC-16/MODBUS (reflected 0xA001, init 0xFFFF)
pub fn crc16_modbus(data: &[u8]) -> u16 {
    ::crc16::State::<::crc16::MODBUS>::calculate(data)
}

/// Response validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModbusError {
    /// Response came from a different slave
    WrongSlave,
    /// Function code does not match the request
    WrongFunction,
    /// Byte count disagrees with the requested register count
    ByteCountMismatch,
    /// Trailing CRC does not match the frame
    CrcMismatch,
    /// Write response is not an echo of the request
    EchoMismatch,
    /// Device answered with an exception code
    Exception(u8),
    /// Request asks for more registers than the parser can hold
    FrameTooLong,
}

/// A request to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Read `count` holding registers starting at `register`
    ReadHolding { slave: u8, register: u16, count: u16 },
    /// Write `value` to `register`
    WriteSingle { slave: u8, register: u16, value: u16 },
}

impl Request {
    /// Read a single holding register
    pub const fn read(slave: u8, register: u16) -> Self {
        Self::ReadHolding {
            slave,
            register,
            count: 1,
        }
    }

    /// Write a single holding register
    pub const fn write(slave: u8, register: u16, value: u16) -> Self {
        Self::WriteSingle {
            slave,
            register,
            value,
        }
    }

    pub const fn slave(&self) -> u8 {
        match *self {
            Self::ReadHolding { slave, .. } | Self::WriteSingle { slave, .. } => slave,
        }
    }

    pub const fn function(&self) -> u8 {
        match self {
            Self::ReadHolding { .. } => FN_READ_HOLDING,
            Self::WriteSingle { .. } => FN_WRITE_SINGLE,
        }
    }

    pub const fn register(&self) -> u16 {
        match *self {
            Self::ReadHolding { register, .. } | Self::WriteSingle { register, .. } => register,
        }
    }

    /// Length of a well-formed, non-exception response
    pub const fn response_len(&self) -> usize {
        match *self {
            Self::ReadHolding { count, .. } => 3 + 2 * count as usize + 2,
            Self::WriteSingle { .. } => REQUEST_LEN,
        }
    }

    /// Encode into the 8-byte wire format
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let (slave, register, word) = match *self {
            Self::ReadHolding {
                slave,
                register,
                count,
            } => (slave, register, count),
            Self::WriteSingle {
                slave,
                register,
                value,
            } => (slave, register, value),
        };

        let mut out = [0u8; REQUEST_LEN];
        out[0] = slave;
        out[1] = self.function();
        out[2..4].copy_from_slice(&register.to_be_bytes());
        out[4..6].copy_from_slice(&word.to_be_bytes());
        let crc = crc16_modbus(&out[..6]);
        out[6..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a request, as a device would
    pub fn decode(raw: &[u8]) -> Result<Self, ModbusError> {
        if raw.len() != REQUEST_LEN {
            return Err(ModbusError::FrameTooLong);
        }
        check_crc(raw)?;

        let slave = raw[0];
        let register = u16::from_be_bytes([raw[2], raw[3]]);
        let word = u16::from_be_bytes([raw[4], raw[5]]);
        match raw[1] {
            FN_READ_HOLDING => Ok(Self::ReadHolding {
                slave,
                register,
                count: word,
            }),
            FN_WRITE_SINGLE => Ok(Self::WriteSingle {
                slave,
                register,
                value: word,
            }),
            _ => Err(ModbusError::WrongFunction),
        }
    }
}

/// A validated response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Register values from a read, in request order
    Registers {
        slave: u8,
        values: Vec<u16, MAX_READ_REGISTERS>,
    },
    /// Echo of a successful write
    WriteAck { slave: u8, register: u16, value: u16 },
}

impl Response {
    /// First register of a read response
    pub fn first_register(&self) -> Option<u16> {
        match self {
            Self::Registers { values, .. } => values.first().copied(),
            Self::WriteAck { .. } => None,
        }
    }

    /// Encode as the device would send it
    pub fn encode(&self) -> Vec<u8, MAX_RESPONSE_LEN> {
        let mut out: Vec<u8, MAX_RESPONSE_LEN> = Vec::new();
        match self {
            Self::Registers { slave, values } => {
                let _ = out.push(*slave);
                let _ = out.push(FN_READ_HOLDING);
                let _ = out.push((values.len() * 2) as u8);
                for v in values {
                    let _ = out.extend_from_slice(&v.to_be_bytes());
                }
            }
            Self::WriteAck {
                slave,
                register,
                value,
            } => {
                let echo = Request::write(*slave, *register, *value).encode();
                let _ = out.extend_from_slice(&echo);
                return out;
            }
        }
        let crc = crc16_modbus(&out);
        let _ = out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

/// Encode an exception response
pub fn encode_exception(slave: u8, function: u8, code: u8) -> [u8; EXCEPTION_LEN] {
    let mut out = [slave, function | EXCEPTION_FLAG, code, 0, 0];
    let crc = crc16_modbus(&out[..3]);
    out[3..].copy_from_slice(&crc.to_le_bytes());
    out
}

fn check_crc(frame: &[u8]) -> Result<(), ModbusError> {
    let (body, tail) = frame.split_at(frame.len() - 2);
    if crc16_modbus(body) == u16::from_le_bytes([tail[0], tail[1]]) {
        Ok(())
    } else {
        Err(ModbusError::CrcMismatch)
    }
}

/// Incremental parser for the response to one request
///
/// Structural checks (slave, function, byte count) fail as soon as the
/// offending byte arrives; the CRC is checked when the frame is complete.
/// After any result the parser must be re-armed with [`Self::reset`] or
/// replaced for the next exchange.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    request: Request,
    buffer: Vec<u8, MAX_RESPONSE_LEN>,
    expected: usize,
}

impl ResponseParser {
    /// Create a parser for the response to `request`
    pub fn new(request: Request) -> Self {
        Self {
            request,
            buffer: Vec::new(),
            expected: request.response_len(),
        }
    }

    /// The request this parser answers
    pub fn request(&self) -> Request {
        self.request
    }

    /// Bytes received so far
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partial response
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = self.request.response_len();
    }

    /// Feed a single byte
    ///
    /// Returns `Ok(Some(response))` once a complete valid response has
    /// arrived, `Ok(None)` while more bytes are needed.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Response>, ModbusError> {
        if self.expected > MAX_RESPONSE_LEN {
            return Err(ModbusError::FrameTooLong);
        }
        if self.buffer.push(byte).is_err() {
            self.reset();
            return Err(ModbusError::FrameTooLong);
        }

        match self.buffer.len() {
            1 => {
                if byte != self.request.slave() {
                    self.reset();
                    return Err(ModbusError::WrongSlave);
                }
            }
            2 => {
                if byte == self.request.function() | EXCEPTION_FLAG {
                    self.expected = EXCEPTION_LEN;
                } else if byte != self.request.function() {
                    self.reset();
                    return Err(ModbusError::WrongFunction);
                }
            }
            3 => {
                if let Request::ReadHolding { count, .. } = self.request {
                    let exception = self.buffer[1] & EXCEPTION_FLAG != 0;
                    if !exception && byte as usize != 2 * count as usize {
                        self.reset();
                        return Err(ModbusError::ByteCountMismatch);
                    }
                }
            }
            _ => {}
        }

        if self.buffer.len() < self.expected {
            return Ok(None);
        }

        let result = self.finish();
        self.reset();
        result.map(Some)
    }

    /// Feed a slice, stopping at the first result
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> (usize, Result<Option<Response>, ModbusError>) {
        for (i, &byte) in bytes.iter().enumerate() {
            match self.feed(byte) {
                Ok(None) => {}
                other => return (i + 1, other),
            }
        }
        (bytes.len(), Ok(None))
    }

    fn finish(&self) -> Result<Response, ModbusError> {
        let frame = self.buffer.as_slice();
        check_crc(frame)?;

        if frame[1] & EXCEPTION_FLAG != 0 {
            return Err(ModbusError::Exception(frame[2]));
        }

        match self.request {
            Request::ReadHolding { slave, count, .. } => {
                let mut values = Vec::new();
                for pair in frame[3..3 + 2 * count as usize].chunks_exact(2) {
                    values
                        .push(u16::from_be_bytes([pair[0], pair[1]]))
                        .map_err(|_| ModbusError::FrameTooLong)?;
                }
                Ok(Response::Registers { slave, values })
            }
            Request::WriteSingle {
                slave,
                register,
                value,
            } => {
                if frame != self.request.encode() {
                    return Err(ModbusError::EchoMismatch);
                }
                Ok(Response::WriteAck {
                    slave,
                    register,
                    value,
                })
            }
        }
    }
}
