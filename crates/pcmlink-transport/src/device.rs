use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::memory::DEFAULT_TX_CAPACITY;
use crate::traits::Transport;

/// A FIFO bridge exposed as a character device (e.g. `/dev/ttyUSB0`).
///
/// The node is opened nonblocking. Read availability comes from `FIONREAD`;
/// write availability is the configured TX capacity minus the bytes still
/// queued in the driver (`TIOCOUTQ`). Terminal nodes are switched to raw mode
/// so no byte is rewritten by the line discipline. The descriptor is closed
/// on drop.
pub struct FifoDevice {
    file: File,
    path: PathBuf,
    tx_capacity: usize,
}

impl FifoDevice {
    /// Open a device node with the default TX capacity (64 KiB).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_TX_CAPACITY)
    }

    /// Open a device node with an explicit TX capacity.
    pub fn open_with_capacity(path: impl AsRef<Path>, tx_capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        let device = Self {
            file,
            path,
            tx_capacity,
        };
        device.make_raw().map_err(|source| TransportError::Open {
            path: device.path.clone(),
            source,
        })?;

        info!(path = ?device.path, tx_capacity, "opened fifo device");
        Ok(device)
    }

    /// The path this device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured TX capacity in bytes.
    pub fn tx_capacity(&self) -> usize {
        self.tx_capacity
    }

    fn make_raw(&self) -> std::io::Result<()> {
        let fd = self.file.as_raw_fd();

        // SAFETY: `fd` is an open descriptor owned by `self.file`.
        if unsafe { libc::isatty(fd) } != 1 {
            debug!(path = ?self.path, "not a terminal; leaving line settings alone");
            return Ok(());
        }

        // SAFETY: termios is plain data; tcgetattr fully initializes it on success.
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is open and `termios` is a valid writable pointer.
        if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: `termios` was initialized by tcgetattr above.
        unsafe { libc::cfmakeraw(&mut termios) };
        // SAFETY: `fd` is open and `termios` is a valid pointer.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        debug!(path = ?self.path, "terminal switched to raw mode");
        Ok(())
    }

    fn queued_outbound(&self) -> std::io::Result<usize> {
        let mut queued: libc::c_int = 0;
        // SAFETY: TIOCOUTQ writes a single c_int through the provided pointer.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), libc::TIOCOUTQ, &mut queued) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // Plain FIFOs have no output queue to report.
            if err.raw_os_error() == Some(libc::ENOTTY) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(usize::try_from(queued).unwrap_or(0))
    }
}

impl Transport for FifoDevice {
    fn bytes_available_to_read(&mut self) -> Result<usize> {
        let mut available: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the provided pointer.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), libc::FIONREAD, &mut available) };
        if rc != 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        Ok(usize::try_from(available).unwrap_or(0))
    }

    fn bytes_available_to_write(&mut self) -> Result<usize> {
        let queued = self.queued_outbound()?;
        Ok(self.tx_capacity.saturating_sub(queued))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.file.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.file.write(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        "fifo-device"
    }
}

impl std::fmt::Debug for FifoDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoDevice")
            .field("path", &self.path)
            .field("tx_capacity", &self.tx_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_fifo(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pcmlink-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("link.fifo");
        let _ = std::fs::remove_file(&path);
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes()).unwrap();
        // SAFETY: `c_path` is a valid NUL-terminated path.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(rc, 0, "mkfifo should succeed");
        path
    }

    #[test]
    fn open_missing_path_reports_open_error() {
        let result = FifoDevice::open("/nonexistent/pcmlink/device");
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn fifo_roundtrip_through_single_descriptor() {
        let path = temp_fifo("roundtrip");
        let mut device = FifoDevice::open_with_capacity(&path, 512).unwrap();

        assert_eq!(device.bytes_available_to_read().unwrap(), 0);
        assert_eq!(device.bytes_available_to_write().unwrap(), 512);

        assert_eq!(device.write(b"\x01\x11").unwrap(), 2);
        assert_eq!(device.bytes_available_to_read().unwrap(), 2);

        let mut buf = [0u8; 2];
        assert_eq!(device.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x01, 0x11]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn empty_nonblocking_read_returns_zero() {
        let path = temp_fifo("empty");
        let mut device = FifoDevice::open(&path).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
        assert_eq!(device.transport_name(), "fifo-device");

        let _ = std::fs::remove_file(&path);
    }
}
