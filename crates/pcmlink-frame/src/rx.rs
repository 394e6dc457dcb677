use tracing::{debug, trace};

use crate::codec::HeaderCodec;
use crate::error::{FrameError, Result};
use crate::protocol::{CommandKind, Direction};

/// A decoded unit of device output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    /// One payload byte of an FPGA_DATA frame.
    Data(u8),
    /// One payload byte of an FPGA_LOOPBACK frame.
    Loopback(u8),
    /// The device stopped with this status code (0 = success).
    Stopped(u8),
}

/// Device-output parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    AwaitCommand,
    StreamPayload { remaining: usize },
    LoopbackPayload { remaining: usize },
    StoppedPayload,
    Stopped,
}

impl RxState {
    pub fn name(self) -> &'static str {
        match self {
            RxState::AwaitCommand => "await-command",
            RxState::StreamPayload { .. } => "stream-payload",
            RxState::LoopbackPayload { .. } => "loopback-payload",
            RxState::StoppedPayload => "stopped-payload",
            RxState::Stopped => "stopped",
        }
    }
}

/// Byte-at-a-time parser for the device->host stream.
///
/// Every transition happens per byte, so the events produced do not depend
/// on how the input was split across reads.
#[derive(Debug)]
pub struct RxFramer {
    codec: HeaderCodec,
    state: RxState,
    header: [u8; 3],
    header_len: usize,
    status: Option<u8>,
    strict: bool,
    bytes: u64,
}

impl RxFramer {
    pub fn new(codec: HeaderCodec) -> Self {
        Self {
            codec,
            state: RxState::AwaitCommand,
            header: [0; 3],
            header_len: 0,
            status: None,
            strict: false,
            bytes: 0,
        }
    }

    /// Treat bytes after FPGA_STOPPED as a protocol violation instead of
    /// ignoring them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Advance the parser by one byte.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<RxEvent>> {
        self.bytes += 1;
        match self.state {
            RxState::AwaitCommand => self.header_byte(byte),
            RxState::StreamPayload { remaining } => {
                self.state = payload_state(remaining - 1, |remaining| {
                    RxState::StreamPayload { remaining }
                });
                Ok(Some(RxEvent::Data(byte)))
            }
            RxState::LoopbackPayload { remaining } => {
                self.state = payload_state(remaining - 1, |remaining| {
                    RxState::LoopbackPayload { remaining }
                });
                Ok(Some(RxEvent::Loopback(byte)))
            }
            RxState::StoppedPayload => {
                debug!(status = byte, "device stopped");
                self.status = Some(byte);
                self.state = RxState::Stopped;
                Ok(Some(RxEvent::Stopped(byte)))
            }
            RxState::Stopped => {
                if self.strict {
                    return Err(FrameError::ProtocolViolation(format!(
                        "byte 0x{byte:02x} after FPGA_STOPPED"
                    )));
                }
                trace!(byte, "ignoring byte after stop");
                Ok(None)
            }
        }
    }

    fn header_byte(&mut self, byte: u8) -> Result<Option<RxEvent>> {
        self.header[self.header_len] = byte;
        self.header_len += 1;

        let decoded = self
            .codec
            .decode_header(Direction::DeviceToHost, &self.header[..self.header_len]);
        let (header, _) = match decoded {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.header_len = 0;
                return Err(err);
            }
        };
        self.header_len = 0;

        trace!(kind = %header.kind, length = header.length, "device command");
        self.state = match header.kind {
            CommandKind::FpgaData => {
                payload_state(header.length, |remaining| RxState::StreamPayload { remaining })
            }
            CommandKind::FpgaLoopback => {
                payload_state(header.length, |remaining| RxState::LoopbackPayload { remaining })
            }
            CommandKind::FpgaStopped => {
                if header.length != 1 {
                    return Err(FrameError::ProtocolViolation(format!(
                        "FPGA_STOPPED carries {} bytes (expected 1)",
                        header.length
                    )));
                }
                RxState::StoppedPayload
            }
            other => {
                return Err(FrameError::ProtocolViolation(format!(
                    "host command {other} received from device"
                )))
            }
        };
        Ok(None)
    }

    /// Push every byte of `bytes`, appending events to `events`.
    ///
    /// Stops at the first error; events produced before it are kept.
    pub fn feed(&mut self, bytes: &[u8], events: &mut Vec<RxEvent>) -> Result<()> {
        for &byte in bytes {
            if let Some(event) = self.push_byte(byte)? {
                events.push(event);
            }
        }
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.state == RxState::Stopped
    }

    /// Status byte of FPGA_STOPPED, once received.
    pub fn status(&self) -> Option<u8> {
        self.status
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Total bytes pushed.
    pub fn bytes_received(&self) -> u64 {
        self.bytes
    }
}

fn payload_state(remaining: usize, state: impl FnOnce(usize) -> RxState) -> RxState {
    if remaining == 0 {
        RxState::AwaitCommand
    } else {
        state(remaining)
    }
}
