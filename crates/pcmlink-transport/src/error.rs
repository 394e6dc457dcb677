use std::path::PathBuf;

/// Errors that can occur on the FIFO link.
///
/// Every variant is fatal for the running session: the link has no defined
/// recovery short of reopening the device.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device node.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the link, including availability queries.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link delivered fewer bytes than it reported as available.
    #[error("short read ({received} of {requested} bytes)")]
    ShortRead { requested: usize, received: usize },

    /// The link accepted fewer bytes than the frame being written.
    #[error("short write ({written} of {requested} bytes)")]
    ShortWrite { requested: usize, written: usize },

    /// The peer side of the link has gone away.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
