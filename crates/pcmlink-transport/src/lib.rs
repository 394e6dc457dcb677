//! Poll-based duplex FIFO link abstraction.
//!
//! The host talks to the FPGA through a synchronous FIFO bridge that only
//! exposes "how many bytes can I read/write right now" plus best-effort
//! read/write calls. This crate models exactly that surface:
//! - [`Transport`], the trait every link implements
//! - [`MemoryLink`], a bounded in-memory link with a device-side handle
//! - [`FifoDevice`], a nonblocking character device or FIFO node (unix)
//!
//! This is the lowest layer of pcmlink. The session driver is the only
//! consumer.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod device;

pub use error::{Result, TransportError};
pub use memory::{DeviceEnd, MemoryLink, DEFAULT_TX_CAPACITY};
pub use traits::Transport;

#[cfg(unix)]
pub use device::FifoDevice;
