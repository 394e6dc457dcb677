//! SETUP_OUTPUT payload encoding.
//!
//! The audio setup payload is one byte:
//! ```text
//! ┌──────┬────────┬───────────┬───────────┐
//! │ port │ unused │ rate code │ bit depth │
//! │ 7:6  │   5    │    4:2    │    1:0    │
//! └──────┴────────┴───────────┴───────────┘
//! ```
//! The test command set uses a three byte START payload instead, see
//! [`TestSetup`].

use std::fmt;

use crate::error::{FrameError, Result};

/// PCM format of the stream, taken from the WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub channels: u16,
    pub bits_per_sample: u16,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn new(channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
        }
    }

    /// Bytes in one sample frame (all channels).
    pub fn block_align(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample).div_ceil(8)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ch, {} bit, {} Hz",
            self.channels, self.bits_per_sample, self.sample_rate
        )
    }
}

/// One of the four physical outputs: 0 and 1 are I2S, 2 and 3 are S/PDIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputPort(u8);

impl OutputPort {
    pub const MAX: u8 = 3;

    pub fn new(port: u8) -> Result<Self> {
        if port > Self::MAX {
            return Err(FrameError::InvalidOutputPort(port));
        }
        Ok(Self(port))
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_spdif(self) -> bool {
        self.0 >= 2
    }

    /// Interface family name, as used in capture file names.
    pub const fn interface(self) -> &'static str {
        if self.is_spdif() {
            "spdif"
        } else {
            "i2s"
        }
    }
}

impl TryFrom<u8> for OutputPort {
    type Error = FrameError;

    fn try_from(port: u8) -> Result<Self> {
        Self::new(port)
    }
}

/// Bit depth code, bits[1:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    /// DSD over PCM. Defined by the FPGA, never derived from a WAV header.
    Dop,
    Bits16,
    Bits24,
    Bits32,
}

impl BitDepth {
    pub fn from_bits(bits_per_sample: u16) -> Result<Self> {
        match bits_per_sample {
            16 => Ok(BitDepth::Bits16),
            24 => Ok(BitDepth::Bits24),
            32 => Ok(BitDepth::Bits32),
            other => Err(FrameError::UnsupportedBitDepth(other)),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            BitDepth::Dop => 0x00,
            BitDepth::Bits16 => 0x01,
            BitDepth::Bits24 => 0x02,
            BitDepth::Bits32 => 0x03,
        }
    }

    pub const fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0x01 => BitDepth::Bits16,
            0x02 => BitDepth::Bits24,
            0x03 => BitDepth::Bits32,
            _ => BitDepth::Dop,
        }
    }

    /// PCM sample width, `None` for DoP.
    pub const fn bits(self) -> Option<u16> {
        match self {
            BitDepth::Dop => None,
            BitDepth::Bits16 => Some(16),
            BitDepth::Bits24 => Some(24),
            BitDepth::Bits32 => Some(32),
        }
    }
}

/// Sample rate and clock family code, bits[4:2].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz44100,
    Hz88200,
    Hz176400,
    Hz352800,
    Hz48000,
    Hz96000,
    Hz192000,
    Hz384000,
}

const SAMPLE_RATES: [(SampleRate, u32, u8); 8] = [
    (SampleRate::Hz44100, 44_100, 0x00),
    (SampleRate::Hz88200, 88_200, 0x04),
    (SampleRate::Hz176400, 176_400, 0x08),
    (SampleRate::Hz352800, 352_800, 0x0c),
    (SampleRate::Hz48000, 48_000, 0x10),
    (SampleRate::Hz96000, 96_000, 0x14),
    (SampleRate::Hz192000, 192_000, 0x18),
    (SampleRate::Hz384000, 384_000, 0x1c),
];

impl SampleRate {
    pub const ALL: [SampleRate; 8] = [
        SampleRate::Hz44100,
        SampleRate::Hz88200,
        SampleRate::Hz176400,
        SampleRate::Hz352800,
        SampleRate::Hz48000,
        SampleRate::Hz96000,
        SampleRate::Hz192000,
        SampleRate::Hz384000,
    ];

    pub fn from_hz(hz: u32) -> Result<Self> {
        SAMPLE_RATES
            .iter()
            .find(|(_, rate, _)| *rate == hz)
            .map(|(rate, _, _)| *rate)
            .ok_or(FrameError::UnsupportedSampleRate(hz))
    }

    pub fn from_code(code: u8) -> Self {
        SAMPLE_RATES
            .iter()
            .find(|(_, _, c)| *c == code & 0x1c)
            .map(|(rate, _, _)| *rate)
            .unwrap_or(SampleRate::Hz44100)
    }

    fn entry(self) -> (u32, u8) {
        SAMPLE_RATES
            .iter()
            .find(|(rate, _, _)| *rate == self)
            .map(|(_, hz, code)| (*hz, *code))
            .unwrap_or((44_100, 0x00))
    }

    pub fn hz(self) -> u32 {
        self.entry().0
    }

    pub fn code(self) -> u8 {
        self.entry().1
    }
}

/// Decoded SETUP_OUTPUT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPayload {
    pub depth: BitDepth,
    pub rate: SampleRate,
    pub port: OutputPort,
}

impl SetupPayload {
    pub fn to_byte(self) -> u8 {
        self.depth.code() | self.rate.code() | (self.port.get() << 6)
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & 0x20 != 0 {
            return Err(FrameError::ProtocolViolation(format!(
                "setup byte 0x{byte:02x} sets reserved bit 5"
            )));
        }
        Ok(Self {
            depth: BitDepth::from_code(byte),
            rate: SampleRate::from_code(byte),
            port: OutputPort(byte >> 6),
        })
    }
}

/// Build the SETUP_OUTPUT payload for `format` on `port`.
///
/// Checks run in a fixed order (bit depth, sample rate, channel count) and
/// the first failure is returned.
pub fn encode_setup(format: &AudioFormat, port: OutputPort) -> Result<[u8; 1]> {
    let depth = BitDepth::from_bits(format.bits_per_sample)?;
    let rate = SampleRate::from_hz(format.sample_rate)?;
    // Mono is not supported by the FPGA output stage.
    if format.channels != 2 {
        return Err(FrameError::UnsupportedChannelCount(format.channels));
    }
    Ok([SetupPayload { depth, rate, port }.to_byte()])
}

/// Parse a SETUP_OUTPUT payload.
pub fn decode_setup(payload: &[u8]) -> Result<SetupPayload> {
    match payload {
        [byte] => SetupPayload::from_byte(*byte),
        _ => Err(FrameError::ProtocolViolation(format!(
            "setup payload is {} bytes (expected 1)",
            payload.len()
        ))),
    }
}

/// START payload of the test command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestSetup {
    pub test_number: u8,
    pub payload_length: u8,
    pub packet_count: u8,
}

impl TestSetup {
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.test_number, self.payload_length, self.packet_count]
    }

    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        match payload {
            [test_number, payload_length, packet_count] => Ok(Self {
                test_number: *test_number,
                payload_length: *payload_length,
                packet_count: *packet_count,
            }),
            _ => Err(FrameError::ProtocolViolation(format!(
                "test start payload is {} bytes (expected 3)",
                payload.len()
            ))),
        }
    }
}
