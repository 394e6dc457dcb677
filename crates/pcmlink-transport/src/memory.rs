use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default outbound FIFO capacity, matching the FT245 synchronous FIFO
/// buffer size configured by the host tools.
pub const DEFAULT_TX_CAPACITY: usize = 0x10000;

#[derive(Debug)]
struct Shared {
    /// Host -> device bytes not yet consumed by the device side.
    outbound: VecDeque<u8>,
    /// Device -> host bytes not yet read by the host.
    inbound: VecDeque<u8>,
    tx_capacity: usize,
    /// Caps how many inbound bytes a single availability query reports.
    read_chunk: Option<usize>,
    closed: bool,
}

/// Host end of a bounded in-memory FIFO link.
///
/// Paired with a [`DeviceEnd`] that plays the FPGA: it drains what the host
/// wrote and pushes bytes back. The outbound side honours a fixed capacity,
/// so backpressure behaves like the hardware FIFO.
#[derive(Debug, Clone)]
pub struct MemoryLink {
    shared: Arc<Mutex<Shared>>,
}

/// Device end of a [`MemoryLink`].
#[derive(Debug, Clone)]
pub struct DeviceEnd {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryLink {
    /// Create a linked host/device pair with the default TX capacity.
    pub fn pair() -> (MemoryLink, DeviceEnd) {
        Self::with_capacity(DEFAULT_TX_CAPACITY)
    }

    /// Create a linked host/device pair with an explicit TX capacity.
    pub fn with_capacity(tx_capacity: usize) -> (MemoryLink, DeviceEnd) {
        let shared = Arc::new(Mutex::new(Shared {
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            tx_capacity,
            read_chunk: None,
            closed: false,
        }));
        (
            MemoryLink {
                shared: Arc::clone(&shared),
            },
            DeviceEnd { shared },
        )
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryLink {
    fn bytes_available_to_read(&mut self) -> Result<usize> {
        let shared = self.lock();
        let available = shared.inbound.len();
        Ok(shared.read_chunk.map_or(available, |cap| available.min(cap)))
    }

    fn bytes_available_to_write(&mut self) -> Result<usize> {
        let shared = self.lock();
        if shared.closed {
            return Err(TransportError::Closed);
        }
        Ok(shared.tx_capacity.saturating_sub(shared.outbound.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut shared = self.lock();
        let n = buf.len().min(shared.inbound.len());
        for (dst, src) in buf.iter_mut().zip(shared.inbound.drain(..n)) {
            *dst = src;
        }
        trace!(n, "memory link read");
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut shared = self.lock();
        if shared.closed {
            return Err(TransportError::Closed);
        }
        let free = shared.tx_capacity.saturating_sub(shared.outbound.len());
        let n = buf.len().min(free);
        shared.outbound.extend(&buf[..n]);
        trace!(n, "memory link write");
        Ok(n)
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

impl DeviceEnd {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for the host to read.
    pub fn push(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes);
    }

    /// Drain everything the host has written so far, freeing FIFO space.
    pub fn take(&self) -> Vec<u8> {
        self.lock().outbound.drain(..).collect()
    }

    /// Drain at most `max` bytes the host has written.
    pub fn take_up_to(&self, max: usize) -> Vec<u8> {
        let mut shared = self.lock();
        let n = max.min(shared.outbound.len());
        shared.outbound.drain(..n).collect()
    }

    /// Bytes written by the host and still occupying the FIFO.
    pub fn pending_outbound(&self) -> usize {
        self.lock().outbound.len()
    }

    /// Change the outbound FIFO capacity.
    pub fn set_tx_capacity(&self, tx_capacity: usize) {
        self.lock().tx_capacity = tx_capacity;
    }

    /// Limit how many inbound bytes each availability query reports.
    pub fn set_read_chunk(&self, read_chunk: Option<usize>) {
        self.lock().read_chunk = read_chunk;
    }

    /// Mark the link as closed; further host writes fail.
    pub fn close(&self) {
        self.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_respects_capacity() {
        let (mut host, device) = MemoryLink::with_capacity(4);

        assert_eq!(host.bytes_available_to_write().unwrap(), 4);
        assert_eq!(host.write(b"abcdef").unwrap(), 4);
        assert_eq!(host.bytes_available_to_write().unwrap(), 0);

        assert_eq!(device.take_up_to(3), b"abc");
        assert_eq!(host.bytes_available_to_write().unwrap(), 3);
        assert_eq!(device.take(), b"d");
    }

    #[test]
    fn read_returns_device_bytes_in_order() {
        let (mut host, device) = MemoryLink::pair();
        device.push(&[1, 2, 3]);
        device.push(&[4]);

        assert_eq!(host.bytes_available_to_read().unwrap(), 4);
        let mut buf = [0u8; 3];
        assert_eq!(host.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(host.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
        assert_eq!(host.bytes_available_to_read().unwrap(), 0);
    }

    #[test]
    fn read_chunk_caps_reported_availability() {
        let (mut host, device) = MemoryLink::pair();
        device.push(&[0; 10]);
        device.set_read_chunk(Some(3));

        assert_eq!(host.bytes_available_to_read().unwrap(), 3);
        device.set_read_chunk(None);
        assert_eq!(host.bytes_available_to_read().unwrap(), 10);
    }

    #[test]
    fn closed_link_rejects_writes() {
        let (mut host, device) = MemoryLink::pair();
        device.close();

        assert!(matches!(host.write(b"x"), Err(TransportError::Closed)));
        assert!(matches!(
            host.bytes_available_to_write(),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn works_through_mut_reference() {
        fn poll(link: &mut impl Transport) -> usize {
            link.bytes_available_to_write().unwrap()
        }

        let (mut host, _device) = MemoryLink::with_capacity(8);
        assert_eq!(poll(&mut &mut host), 8);
        assert_eq!(host.transport_name(), "memory");
    }
}
