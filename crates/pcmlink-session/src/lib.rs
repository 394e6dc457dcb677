//! Session layer for the host/FPGA FIFO link.
//!
//! This is the layer applications use. It glues a [`StreamSource`] and an
//! [`RxObserver`] to a transport through the poll-driven [`Session`], and
//! provides the payload sources the host tools need:
//! - [`PcmSource`], raw PCM from a WAV file
//! - [`TestPattern`], counting payload for the FPGA test core
//!
//! Plus a [`SimulatedFpga`] for running without hardware, command-stream
//! [`render`]ing for HDL simulation, and the unframed [`RawLoopback`] check.
//!
//! [`StreamSource`]: pcmlink_frame::StreamSource

pub mod capture;
pub mod driver;
pub mod error;
pub mod loopback;
pub mod observer;
pub mod pattern;
pub mod sim;
pub mod wav;

pub use capture::{capture_file_name, render, RenderSummary};
pub use driver::{Poll, Session, SessionConfig, SessionReport, DEFAULT_READ_BUFFER_SIZE};
pub use error::{Result, SessionError};
pub use loopback::{LoopbackConfig, LoopbackReport, RawLoopback};
pub use observer::{EventLog, IgnoreEvents, RxObserver, SequenceVerifier};
pub use pattern::TestPattern;
pub use sim::{Echo, SimConfig, SimulatedFpga, STATUS_BAD_COMMAND, STATUS_SETUP_REJECTED};
pub use wav::PcmSource;
