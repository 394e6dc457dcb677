/// Errors that can occur while running a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pcmlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pcmlink_frame::FrameError),

    /// The WAV input could not be parsed.
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    /// A DATA byte from the device broke the expected incrementing sequence.
    #[error("data sequence mismatch: expected 0x{expected:02x}, got 0x{got:02x}")]
    SequenceMismatch { expected: u8, got: u8 },

    /// Local file I/O (capture output).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
