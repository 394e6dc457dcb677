use crate::error::Result;

/// A full-duplex, fixed-capacity byte link polled by the host.
///
/// All operations are non-blocking and best-effort. Callers query the
/// availability first and then transfer at most that many bytes; a transfer
/// that moves fewer bytes than a prior query promised is a fatal error for
/// the caller to report.
pub trait Transport {
    /// Number of inbound bytes that can be read right now.
    fn bytes_available_to_read(&mut self) -> Result<usize>;

    /// Free space in the outbound FIFO, in bytes.
    fn bytes_available_to_write(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes; returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to `buf.len()` bytes; returns the number of bytes accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "transport"
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn bytes_available_to_read(&mut self) -> Result<usize> {
        (**self).bytes_available_to_read()
    }

    fn bytes_available_to_write(&mut self) -> Result<usize> {
        (**self).bytes_available_to_write()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_available_to_read(&mut self) -> Result<usize> {
        (**self).bytes_available_to_read()
    }

    fn bytes_available_to_write(&mut self) -> Result<usize> {
        (**self).bytes_available_to_write()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
