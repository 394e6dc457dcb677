//! Raw loopback check.
//!
//! No framing at all: the host writes `packet_count` packets of
//! `packet_bytes` counting bytes and expects the FPGA loopback core to
//! return the same byte sequence.

use pcmlink_transport::{Transport, TransportError};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Loopback parameters.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackConfig {
    pub packet_bytes: usize,
    pub packet_count: usize,
    /// Largest single read from the transport.
    pub read_buffer_size: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            packet_bytes: 1,
            packet_count: 1,
            read_buffer_size: pcmlink_transport::DEFAULT_TX_CAPACITY,
        }
    }
}

impl LoopbackConfig {
    pub fn total_bytes(&self) -> u64 {
        self.packet_bytes as u64 * self.packet_count as u64
    }
}

/// Loopback counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopbackReport {
    pub packets_sent: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub expected_bytes: u64,
    pub complete: bool,
}

/// Poll-driven raw loopback run.
pub struct RawLoopback<T> {
    transport: T,
    config: LoopbackConfig,
    read_buf: Vec<u8>,
    packet: Vec<u8>,
    out_value: u8,
    in_value: u8,
    packets_sent: u64,
    tx_bytes: u64,
    rx_bytes: u64,
}

impl<T: Transport> RawLoopback<T> {
    pub fn new(transport: T, config: LoopbackConfig) -> Self {
        Self {
            transport,
            read_buf: vec![0; config.read_buffer_size.max(1)],
            packet: Vec::with_capacity(config.packet_bytes),
            config,
            out_value: 0,
            in_value: 0,
            packets_sent: 0,
            tx_bytes: 0,
            rx_bytes: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rx_bytes == self.config.total_bytes()
    }

    /// One iteration: check echoed bytes, then send the next packet if it fits.
    ///
    /// Returns true once every byte has come back.
    pub fn poll_once(&mut self) -> Result<bool> {
        if self.is_complete() {
            return Ok(true);
        }

        let available = self.transport.bytes_available_to_read()?;
        if available > 0 {
            let requested = available.min(self.read_buf.len());
            let received = self.transport.read(&mut self.read_buf[..requested])?;
            if received != requested {
                return Err(TransportError::ShortRead {
                    requested,
                    received,
                }
                .into());
            }
            for &got in &self.read_buf[..received] {
                if got != self.in_value {
                    return Err(SessionError::SequenceMismatch {
                        expected: self.in_value,
                        got,
                    });
                }
                self.in_value = self.in_value.wrapping_add(1);
            }
            self.rx_bytes += received as u64;
            debug!(rx_bytes = self.rx_bytes, "loopback bytes verified");
            if self.is_complete() {
                info!(rx_bytes = self.rx_bytes, "loopback complete");
                return Ok(true);
            }
        }

        if self.packets_sent < self.config.packet_count as u64 {
            if self.packet.is_empty() {
                for _ in 0..self.config.packet_bytes {
                    self.packet.push(self.out_value);
                    self.out_value = self.out_value.wrapping_add(1);
                }
            }
            if self.transport.bytes_available_to_write()? >= self.packet.len() {
                let written = self.transport.write(&self.packet)?;
                if written != self.packet.len() {
                    return Err(TransportError::ShortWrite {
                        requested: self.packet.len(),
                        written,
                    }
                    .into());
                }
                self.tx_bytes += written as u64;
                self.packets_sent += 1;
                self.packet.clear();
            }
        }
        Ok(false)
    }

    /// Poll until complete or `cancelled` returns true.
    pub fn run_until(&mut self, mut cancelled: impl FnMut() -> bool) -> Result<LoopbackReport> {
        while !self.poll_once()? {
            if cancelled() {
                break;
            }
        }
        Ok(self.report())
    }

    pub fn report(&self) -> LoopbackReport {
        LoopbackReport {
            packets_sent: self.packets_sent,
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            expected_bytes: self.config.total_bytes(),
            complete: self.is_complete(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
