//! Command framing for the host/FPGA FIFO protocol.
//!
//! This is the core of pcmlink. Every frame on the wire is:
//! - A command byte: kind in the top bits, payload length in the low bits
//! - Optionally two big-endian length bytes (wide extended form only)
//! - Exactly `length` payload bytes
//!
//! The crate is pure: it never touches a transport. [`TxFramer`] turns a
//! [`StreamSource`] into frames sized to a caller-supplied budget, and
//! [`RxFramer`] turns inbound bytes into [`RxEvent`]s one byte at a time.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod rx;
pub mod setup;
pub mod tx;

pub use codec::{CommandHeader, Frame, HeaderCodec};
pub use error::{FrameError, Result};
pub use protocol::{CommandKind, CommandSet, Direction, ProtocolForm, EXTENDED_LENGTH};
pub use rx::{RxEvent, RxFramer, RxState};
pub use setup::{
    decode_setup, encode_setup, AudioFormat, BitDepth, OutputPort, SampleRate, SetupPayload,
    TestSetup,
};
pub use tx::{StreamPlan, StreamSource, TxFramer, TxState};
