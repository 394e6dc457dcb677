//! Host side of a USB FIFO link that streams PCM audio to an FPGA.
//!
//! The link is a synchronous FIFO bridge. The host sends small command
//! frames (setup, stream payload, stop) and the FPGA answers with data,
//! loopback and stopped frames.
//!
//! # Crate Structure
//!
//! - [`transport`]: poll-based FIFO link abstraction (device node, memory)
//! - [`frame`]: command headers plus the TX and RX framers
//! - [`session`]: the poll-driven session, payload sources and the simulator

/// Re-export transport types.
pub mod transport {
    pub use pcmlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pcmlink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use pcmlink_session::*;
}
