//! LD2413 frame encoding and decoding
//!
//! Data frame (sensor → host), always 14 bytes:
//! - HEADER (4 bytes): F4 F3 F2 F1
//! - LENGTH (2 bytes, LE): payload length, always 4
//! - DISTANCE (4 bytes, LE): IEEE-754 f32 in millimeters
//! - FOOTER (4 bytes): F8 F7 F6 F5
//!
//! Command / ACK frame (host ↔ sensor):
//! - HEADER (4 bytes): FD FC FB FA
//! - LENGTH (2 bytes, LE): length of command word + value
//! - COMMAND (2 bytes, LE): command word (ACKs set bit 8)
//! - VALUE (0-16 bytes): command argument, or status + data in an ACK
//! - FOOTER (4 bytes): 04 03 02 01
//!
//! There is no checksum; integrity comes from the fixed length and the
//! framing markers.

use heapless::Vec;

use crate::sync::SyncMatcher;

/// Data frame header
pub const DATA_HEADER: [u8; 4] = [0xF4, 0xF3, 0xF2, 0xF1];

/// Data frame footer
pub const DATA_FOOTER: [u8; 4] = [0xF8, 0xF7, 0xF6, 0xF5];

/// Command / ACK frame header
pub const COMMAND_HEADER: [u8; 4] = [0xFD, 0xFC, 0xFB, 0xFA];

/// Command / ACK frame footer
pub const COMMAND_FOOTER: [u8; 4] = [0x04, 0x03, 0x02, 0x01];

/// Payload length carried by every data frame
pub const DATA_PAYLOAD_LEN: u16 = 4;

/// Complete data frame size (HEADER + LENGTH + DISTANCE + FOOTER)
pub const DATA_FRAME_LEN: usize = 4 + 2 + DATA_PAYLOAD_LEN as usize + 4;

/// Maximum command value size in bytes
pub const MAX_COMMAND_VALUE_LEN: usize = 16;

/// Maximum intra-frame data in a command or ACK (command word + value)
pub const MAX_COMMAND_DATA_LEN: usize = 2 + MAX_COMMAND_VALUE_LEN;

/// Maximum complete command frame size
pub const MAX_COMMAND_FRAME_LEN: usize = 4 + 2 + MAX_COMMAND_DATA_LEN + 4;

/// Bit set in the command word of an ACK
pub const ACK_FLAG: u16 = 0x0100;

/// Default inactivity limit between two bytes of the same frame
pub const DEFAULT_INTERBYTE_TIMEOUT_MS: u32 = 100;

/// Command words
pub mod cmd {
    /// Read firmware version
    pub const READ_FIRMWARE_VERSION: u16 = 0x0000;
    /// Enter configuration mode (value 0x0001)
    pub const ENTER_CONFIG: u16 = 0x00FF;
    /// Exit configuration mode (no value)
    pub const EXIT_CONFIG: u16 = 0x00FE;
    /// Read reporting cycle
    pub const READ_REPORT_CYCLE: u16 = 0x0070;
    /// Set reporting cycle (ms)
    pub const SET_REPORT_CYCLE: u16 = 0x0071;
    /// Recalibrate the detection threshold against the current scene
    pub const UPDATE_THRESHOLD: u16 = 0x0072;
    /// Set minimum detection distance (mm)
    pub const SET_MIN_DISTANCE: u16 = 0x0074;
    /// Set maximum detection distance (mm)
    pub const SET_MAX_DISTANCE: u16 = 0x0075;
}

/// Errors that can occur during frame parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Length field disagrees with the protocol
    InvalidLength,
    /// Trailing marker mismatch
    InvalidFooter,
    /// Distance field is NaN or infinite
    InvalidPayload,
    /// Frame stalled mid-way for longer than the inactivity limit
    Timeout,
    /// Command value exceeds maximum allowed size
    PayloadTooLarge,
    /// Buffer too small for encoding
    BufferTooSmall,
}

/// A decoded distance report
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataFrame {
    /// Measured distance in millimeters
    pub distance_mm: f32,
}

impl DataFrame {
    /// Create a frame carrying the given distance
    pub const fn new(distance_mm: f32) -> Self {
        Self { distance_mm }
    }

    /// Encode into the 14-byte wire format
    pub fn encode(&self) -> [u8; DATA_FRAME_LEN] {
        let mut out = [0u8; DATA_FRAME_LEN];
        out[..4].copy_from_slice(&DATA_HEADER);
        out[4..6].copy_from_slice(&DATA_PAYLOAD_LEN.to_le_bytes());
        out[6..10].copy_from_slice(&self.distance_mm.to_le_bytes());
        out[10..].copy_from_slice(&DATA_FOOTER);
        out
    }

    /// Validate a complete frame whose header has already been matched
    fn validate(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() != DATA_FRAME_LEN {
            return Err(FrameError::InvalidLength);
        }

        let length = u16::from_le_bytes([raw[4], raw[5]]);
        if length != DATA_PAYLOAD_LEN {
            return Err(FrameError::InvalidLength);
        }

        if raw[10..] != DATA_FOOTER {
            return Err(FrameError::InvalidFooter);
        }

        let distance_mm = f32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]);
        if !distance_mm.is_finite() {
            return Err(FrameError::InvalidPayload);
        }

        Ok(Self { distance_mm })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Discarding bytes until the header is seen
    SeekingHeader,
    /// Header matched, collecting the rest of the fixed-length frame
    Accumulating,
}

/// State machine for the LD2413 data stream
///
/// Bytes inside a frame are never re-examined as header candidates:
/// once the header is matched, only the frame length, the inactivity
/// timeout, or validation end the frame.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecodeState,
    header: SyncMatcher,
    buffer: Vec<u8, DATA_FRAME_LEN>,
    last_byte_ms: u32,
    timeout_ms: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default inactivity timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_INTERBYTE_TIMEOUT_MS)
    }

    /// Create a decoder that abandons a frame after `timeout_ms` of silence
    pub fn with_timeout(timeout_ms: u32) -> Self {
        Self {
            state: DecodeState::SeekingHeader,
            header: SyncMatcher::new(DATA_HEADER),
            buffer: Vec::new(),
            last_byte_ms: 0,
            timeout_ms,
        }
    }

    /// Reset the decoder state
    pub fn reset(&mut self) {
        self.state = DecodeState::SeekingHeader;
        self.header.reset();
        self.buffer.clear();
    }

    /// True while a frame is partially received
    pub fn is_accumulating(&self) -> bool {
        self.state == DecodeState::Accumulating
    }

    /// Abandon a partial frame that has gone quiet
    ///
    /// Call this between deliveries so a truncated frame does not sit in
    /// the buffer until the next byte arrives.
    pub fn check_timeout(&mut self, now_ms: u32) -> Result<(), FrameError> {
        if self.state == DecodeState::Accumulating
            && now_ms.wrapping_sub(self.last_byte_ms) > self.timeout_ms
        {
            self.reset();
            return Err(FrameError::Timeout);
        }
        Ok(())
    }

    /// Feed a single byte to the decoder
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is decoded,
    /// `Ok(None)` when more bytes are needed, or `Err` when a frame was
    /// discarded. The decoder is always back in a usable state after an
    /// error.
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> Result<Option<DataFrame>, FrameError> {
        let timed_out = self.check_timeout(now_ms);
        self.last_byte_ms = now_ms;

        match self.state {
            DecodeState::SeekingHeader => {
                if self.header.push(byte) {
                    self.buffer.clear();
                    // Cannot fail, buffer holds a whole frame
                    let _ = self.buffer.extend_from_slice(&DATA_HEADER);
                    self.state = DecodeState::Accumulating;
                }
                timed_out.map(|()| None)
            }
            DecodeState::Accumulating => {
                let _ = self.buffer.push(byte);
                if self.buffer.len() < DATA_FRAME_LEN {
                    return Ok(None);
                }

                let result = DataFrame::validate(&self.buffer);
                self.reset();
                result.map(Some)
            }
        }
    }

    /// Feed multiple bytes, returning the first complete frame
    ///
    /// Remaining bytes after a complete frame are not consumed; the
    /// returned count says how many were.
    pub fn feed_bytes(
        &mut self,
        bytes: &[u8],
        now_ms: u32,
    ) -> (usize, Result<Option<DataFrame>, FrameError>) {
        for (i, &byte) in bytes.iter().enumerate() {
            match self.feed(byte, now_ms) {
                Ok(None) => {}
                other => return (i + 1, other),
            }
        }
        (bytes.len(), Ok(None))
    }
}

/// A command sent to the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command word
    pub word: u16,
    /// Argument bytes
    pub value: Vec<u8, MAX_COMMAND_VALUE_LEN>,
}

impl Command {
    /// Create a command with an arbitrary value
    pub fn new(word: u16, value: &[u8]) -> Result<Self, FrameError> {
        let mut v = Vec::new();
        v.extend_from_slice(value)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Ok(Self { word, value: v })
    }

    /// Create a command without a value
    pub fn bare(word: u16) -> Self {
        Self {
            word,
            value: Vec::new(),
        }
    }

    /// Create a command with a single little-endian u16 value
    pub fn with_u16(word: u16, value: u16) -> Self {
        let mut v = Vec::new();
        let _ = v.extend_from_slice(&value.to_le_bytes());
        Self { word, value: v }
    }

    pub fn enter_config() -> Self {
        Self::with_u16(cmd::ENTER_CONFIG, 0x0001)
    }

    pub fn exit_config() -> Self {
        Self::bare(cmd::EXIT_CONFIG)
    }

    pub fn read_firmware_version() -> Self {
        Self::bare(cmd::READ_FIRMWARE_VERSION)
    }

    pub fn set_min_distance(distance_mm: u16) -> Self {
        Self::with_u16(cmd::SET_MIN_DISTANCE, distance_mm)
    }

    pub fn set_max_distance(distance_mm: u16) -> Self {
        Self::with_u16(cmd::SET_MAX_DISTANCE, distance_mm)
    }

    pub fn set_report_cycle(cycle_ms: u16) -> Self {
        Self::with_u16(cmd::SET_REPORT_CYCLE, cycle_ms)
    }

    pub fn read_report_cycle() -> Self {
        Self::bare(cmd::READ_REPORT_CYCLE)
    }

    pub fn calibrate_threshold() -> Self {
        Self::with_u16(cmd::UPDATE_THRESHOLD, 0x0000)
    }

    /// Encode this command into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let data_len = 2 + self.value.len();
        let frame_len = 4 + 2 + data_len + 4;
        if buffer.len() < frame_len {
            return Err(FrameError::BufferTooSmall);
        }

        buffer[..4].copy_from_slice(&COMMAND_HEADER);
        buffer[4..6].copy_from_slice(&(data_len as u16).to_le_bytes());
        buffer[6..8].copy_from_slice(&self.word.to_le_bytes());
        buffer[8..8 + self.value.len()].copy_from_slice(&self.value);
        buffer[8 + self.value.len()..frame_len].copy_from_slice(&COMMAND_FOOTER);

        Ok(frame_len)
    }

    /// Encode this command into a heapless Vec
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_COMMAND_FRAME_LEN>, FrameError> {
        let mut buffer = [0u8; MAX_COMMAND_FRAME_LEN];
        let len = self.encode(&mut buffer)?;
        let mut vec = Vec::new();
        vec.extend_from_slice(&buffer[..len])
            .map_err(|_| FrameError::BufferTooSmall)?;
        Ok(vec)
    }
}

/// A parsed command acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Command word being acknowledged (ACK flag stripped)
    pub command: u16,
    /// Status, 0 on success
    pub status: u16,
    /// Bytes following the status (e.g. firmware version)
    pub data: Vec<u8, MAX_COMMAND_VALUE_LEN>,
}

impl Ack {
    /// True if the sensor reported success
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// True if this ACK answers `command`
    pub fn answers(&self, command: u16) -> bool {
        self.command == command
    }

    /// Encode as the sensor would send it
    pub fn encode_to_vec(&self) -> Result<Vec<u8, MAX_COMMAND_FRAME_LEN>, FrameError> {
        let mut value: Vec<u8, MAX_COMMAND_VALUE_LEN> = Vec::new();
        value
            .extend_from_slice(&self.status.to_le_bytes())
            .map_err(|_| FrameError::PayloadTooLarge)?;
        value
            .extend_from_slice(&self.data)
            .map_err(|_| FrameError::PayloadTooLarge)?;
        Command {
            word: self.command | ACK_FLAG,
            value,
        }
        .encode_to_vec()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    /// Waiting for the command header
    SeekingHeader,
    /// Reading the two length bytes
    ReadingLength,
    /// Reading `expected` bytes of intra-frame data
    ReadingData,
    /// Reading the footer
    ReadingFooter,
}

/// State machine for command acknowledgements
///
/// Data frames interleaved with ACKs are skipped, since their header
/// never matches the command header.
#[derive(Debug, Clone)]
pub struct AckParser {
    state: AckState,
    header: SyncMatcher,
    length: Vec<u8, 2>,
    expected: usize,
    data: Vec<u8, MAX_COMMAND_DATA_LEN>,
    footer: Vec<u8, 4>,
    last_byte_ms: u32,
    timeout_ms: u32,
}

impl Default for AckParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AckParser {
    /// Create a new ACK parser
    pub fn new() -> Self {
        Self {
            state: AckState::SeekingHeader,
            header: SyncMatcher::new(COMMAND_HEADER),
            length: Vec::new(),
            expected: 0,
            data: Vec::new(),
            footer: Vec::new(),
            last_byte_ms: 0,
            timeout_ms: DEFAULT_INTERBYTE_TIMEOUT_MS,
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.state = AckState::SeekingHeader;
        self.header.reset();
        self.length.clear();
        self.expected = 0;
        self.data.clear();
        self.footer.clear();
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, now_ms: u32) -> Result<Option<Ack>, FrameError> {
        let stalled = self.state != AckState::SeekingHeader
            && now_ms.wrapping_sub(self.last_byte_ms) > self.timeout_ms;
        self.last_byte_ms = now_ms;
        if stalled {
            self.reset();
            self.header.push(byte);
            return Err(FrameError::Timeout);
        }

        match self.state {
            AckState::SeekingHeader => {
                if self.header.push(byte) {
                    self.length.clear();
                    self.state = AckState::ReadingLength;
                }
                Ok(None)
            }
            AckState::ReadingLength => {
                let _ = self.length.push(byte);
                if self.length.len() < 2 {
                    return Ok(None);
                }
                let len = u16::from_le_bytes([self.length[0], self.length[1]]) as usize;
                // Command word + status at minimum
                if !(4..=MAX_COMMAND_DATA_LEN).contains(&len) {
                    self.reset();
                    return Err(FrameError::InvalidLength);
                }
                self.expected = len;
                self.data.clear();
                self.state = AckState::ReadingData;
                Ok(None)
            }
            AckState::ReadingData => {
                let _ = self.data.push(byte);
                if self.data.len() == self.expected {
                    self.footer.clear();
                    self.state = AckState::ReadingFooter;
                }
                Ok(None)
            }
            AckState::ReadingFooter => {
                let _ = self.footer.push(byte);
                if self.footer.len() < COMMAND_FOOTER.len() {
                    return Ok(None);
                }
                if self.footer.as_slice() != COMMAND_FOOTER {
                    self.reset();
                    return Err(FrameError::InvalidFooter);
                }

                let word = u16::from_le_bytes([self.data[0], self.data[1]]);
                let status = u16::from_le_bytes([self.data[2], self.data[3]]);
                let mut data = Vec::new();
                let _ = data.extend_from_slice(&self.data[4..]);
                let ack = Ack {
                    command: word & !ACK_FLAG,
                    status,
                    data,
                };

                self.reset();
                Ok(Some(ack))
            }
        }
    }
}
