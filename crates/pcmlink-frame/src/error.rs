use crate::protocol::Direction;

/// Errors that can occur while encoding, decoding or driving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload length does not fit the active header form.
    #[error("invalid payload length ({length} bytes, max {max})")]
    InvalidLength { length: usize, max: usize },

    /// The command bits do not name a known command for this direction.
    #[error("unknown {direction} command byte 0x{byte:02x}")]
    UnknownCommand { byte: u8, direction: Direction },

    /// The peer broke a protocol invariant; the two ends are out of step.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A frame larger than the protocol maximum was requested.
    #[error("frame too large ({requested} bytes, max {max})")]
    FrameTooLarge { requested: usize, max: usize },

    /// The audio bit depth has no setup code.
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// The audio sample rate has no setup code.
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Only stereo streams are accepted.
    #[error("unsupported number of channels: {0}")]
    UnsupportedChannelCount(u16),

    /// Output ports are numbered 0..=3.
    #[error("invalid output port: {0} (expected 0..=3)")]
    InvalidOutputPort(u8),

    /// The payload source failed while producing bytes.
    #[error("payload source error: {0}")]
    Source(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
