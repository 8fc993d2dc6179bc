//! Fixed-format command packets streamed from the handheld controller to the robot.
//!
//! Every packet is exactly [`PACKET_LEN`] bytes, big endian:
//!
//! | Offset | Size | Field        |
//! |--------|------|--------------|
//! | 0      | 1    | command      |
//! | 1      | 1    | control code |
//! | 2      | 2    | reserved     |
//! | 4      | 4    | z (f32)      |
//! | 8      | 4    | y (f32)      |
//! | 12     | 4    | x (f32)      |
//! | 16     | 4    | CRC-32       |
use std::{fmt::Debug, str::FromStr};

use crc::{Crc, CRC_32_ISO_HDLC};

/// Total size of a packet on the wire.
pub const PACKET_LEN: usize = 20;
/// Number of leading bytes covered by the checksum.
pub const BODY_LEN: usize = 16;

/// Command byte that tells the controller to stop.
pub const CMD_STOP: u8 = 0x00;
/// Command byte that allows motion. The controller only drives when every bit is set.
pub const CMD_RUN: u8 = 0xFF;

const OFFSET_CMD: usize = 0;
const OFFSET_CODE: usize = 1;
const OFFSET_Z: usize = 4;
const OFFSET_Y: usize = 8;
const OFFSET_X: usize = 12;
const OFFSET_CRC: usize = BODY_LEN;

/// The zlib/gzip CRC-32.
const CRC_GENERATOR: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One accelerometer reading, in the device's own axis order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl ControlSample {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Selects how the robot translates tilt into wheel speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControlCode(pub u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseControlCodeError {
    #[error("Control code is empty")]
    Empty,
    #[error("Control code {0:?} is longer than two hex digits")]
    TooLong(String),
    #[error("Control code {0:?} is not hexadecimal")]
    NotHex(String),
}

impl FromStr for ControlCode {
    type Err = ParseControlCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseControlCodeError::Empty);
        }
        if s.len() > 2 {
            return Err(ParseControlCodeError::TooLong(s.into()));
        }
        // from_str_radix would also accept a leading '+'
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseControlCodeError::NotHex(s.into()));
        }
        u8::from_str_radix(s, 16)
            .map(ControlCode)
            .map_err(|_| ParseControlCodeError::NotHex(s.into()))
    }
}

impl std::fmt::Display for ControlCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ControlCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A framed, checksummed command ready to be written to the robot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet([u8; PACKET_LEN]);

/// The fields recovered from a packet whose checksum checked out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPacket {
    /// `true` only if the command byte was exactly [`CMD_RUN`].
    pub run: bool,
    pub control_code: u8,
    pub sample: ControlSample,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Packet must be {PACKET_LEN} bytes, got {len}")]
    WrongLength { len: usize },
    #[error("Checksums don't check out (computed {expected:08X}, packet carries {actual:08X})")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Builds a packet from the lock state, control code and a raw sample.
///
/// The command byte is [`CMD_STOP`] whenever `locked` is true, no matter what
/// the axes say. Floats are written as their raw bit patterns, so NaN and
/// infinities go out untouched.
pub fn encode(locked: bool, control_code: u8, x: f32, y: f32, z: f32) -> Packet {
    let mut bytes = [0u8; PACKET_LEN];
    bytes[OFFSET_CMD] = if locked { CMD_STOP } else { CMD_RUN };
    bytes[OFFSET_CODE] = control_code;
    // Axes go out as z, y, x
    bytes[OFFSET_Z..OFFSET_Z + 4].copy_from_slice(&z.to_bits().to_be_bytes());
    bytes[OFFSET_Y..OFFSET_Y + 4].copy_from_slice(&y.to_bits().to_be_bytes());
    bytes[OFFSET_X..OFFSET_X + 4].copy_from_slice(&x.to_bits().to_be_bytes());

    let crc = CRC_GENERATOR.checksum(&bytes[..BODY_LEN]);
    bytes[OFFSET_CRC..].copy_from_slice(&crc.to_be_bytes());
    Packet(bytes)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(word)
}

impl Packet {
    /// Same as [`encode`], taking the typed configuration and sample.
    pub fn new(locked: bool, control_code: ControlCode, sample: ControlSample) -> Self {
        encode(locked, control_code.0, sample.x, sample.y, sample.z)
    }

    /// Wraps raw bytes without checking anything.
    pub const fn from_bytes(bytes: [u8; PACKET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }

    pub fn command_byte(&self) -> u8 {
        self.0[OFFSET_CMD]
    }

    /// The checksum carried in the last four bytes.
    pub fn checksum(&self) -> u32 {
        read_u32(&self.0, OFFSET_CRC)
    }

    /// Verifies and unpacks a frame as the robot-side server would.
    ///
    /// The reserved bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
        if bytes.len() != PACKET_LEN {
            return Err(DecodeError::WrongLength { len: bytes.len() });
        }
        let expected = CRC_GENERATOR.checksum(&bytes[..BODY_LEN]);
        let actual = read_u32(bytes, OFFSET_CRC);
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        Ok(DecodedPacket {
            run: bytes[OFFSET_CMD] == CMD_RUN,
            control_code: bytes[OFFSET_CODE],
            sample: ControlSample {
                x: f32::from_bits(read_u32(bytes, OFFSET_X)),
                y: f32::from_bits(read_u32(bytes, OFFSET_Y)),
                z: f32::from_bits(read_u32(bytes, OFFSET_Z)),
            },
        })
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Packet(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}
