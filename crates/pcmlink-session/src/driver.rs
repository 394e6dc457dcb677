use bytes::BytesMut;
use pcmlink_frame::{
    CommandSet, Frame, HeaderCodec, ProtocolForm, RxEvent, RxFramer, StreamSource, TxFramer,
};
use pcmlink_transport::{Transport, TransportError};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::observer::{IgnoreEvents, RxObserver};

/// Inbound scratch size. The FIFO bridge hands out at most 512 bytes per read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 512;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Header layout the FPGA build expects.
    pub form: ProtocolForm,
    /// Host command table (audio core or test core).
    pub command_set: CommandSet,
    /// Largest single read from the transport.
    pub read_buffer_size: usize,
    /// Upper bound on STREAM_OUTPUT payload, on top of the form maximum.
    pub max_frame_payload: usize,
    /// Fail on bytes received after FPGA_STOPPED.
    pub strict_rx: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            form: ProtocolForm::default(),
            command_set: CommandSet::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_payload: usize::from(u16::MAX),
            strict_rx: false,
        }
    }
}

impl SessionConfig {
    pub fn codec(&self) -> HeaderCodec {
        HeaderCodec::new(self.form, self.command_set)
    }
}

/// Outcome of one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Keep polling.
    Pending,
    /// The device sent FPGA_STOPPED with this status.
    Stopped(u8),
}

/// Counters and final states of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub transport: &'static str,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub frames_sent: u64,
    pub stream_bytes: u64,
    /// FPGA_STOPPED status, if the device stopped.
    pub status: Option<u8>,
    pub tx_state: &'static str,
    pub rx_state: &'static str,
}

/// Drives one TX framer and one RX framer over a transport.
///
/// Each [`poll_once`](Session::poll_once) drains what the device sent, then
/// tries to put the next frame on the wire. A frame is only written when
/// the transport reports room for all of it; until then it waits, unchanged.
pub struct Session<T, S, O = IgnoreEvents> {
    transport: T,
    tx: TxFramer<S>,
    rx: RxFramer,
    observer: O,
    config: SessionConfig,
    codec: HeaderCodec,
    read_buf: Vec<u8>,
    write_buf: BytesMut,
    events: Vec<RxEvent>,
    pending: Option<Frame>,
    tx_bytes: u64,
    rx_bytes: u64,
    frames_sent: u64,
}

impl<T: Transport, S: StreamSource> Session<T, S, IgnoreEvents> {
    /// Create a session that ignores device payload events.
    pub fn new(transport: T, source: S, config: SessionConfig) -> Self {
        Self::with_observer(transport, source, IgnoreEvents, config)
    }
}

impl<T: Transport, S: StreamSource, O: RxObserver> Session<T, S, O> {
    pub fn with_observer(transport: T, source: S, observer: O, config: SessionConfig) -> Self {
        let codec = config.codec();
        info!(
            transport = transport.transport_name(),
            form = %config.form,
            command_set = ?config.command_set,
            "session created"
        );
        Self {
            transport,
            tx: TxFramer::new(source, codec),
            rx: RxFramer::new(codec).strict(config.strict_rx),
            observer,
            read_buf: vec![0; config.read_buffer_size.max(1)],
            write_buf: BytesMut::new(),
            events: Vec::new(),
            pending: None,
            codec,
            config,
            tx_bytes: 0,
            rx_bytes: 0,
            frames_sent: 0,
        }
    }

    /// Run one iteration of the poll loop.
    pub fn poll_once(&mut self) -> Result<Poll> {
        if let Some(status) = self.rx.status() {
            return Ok(Poll::Stopped(status));
        }

        if let Some(status) = self.receive()? {
            info!(status, tx_bytes = self.tx_bytes, rx_bytes = self.rx_bytes, "session stopped");
            return Ok(Poll::Stopped(status));
        }

        if self.pending.is_none() && !self.tx.is_done() {
            let free = self.transport.bytes_available_to_write()?;
            let budget = self.payload_budget(free);
            if let Some(frame) = self.tx.next_frame(budget)? {
                debug!(kind = %frame.kind, length = frame.payload.len(), "frame ready");
                self.pending = Some(frame);
            }
        }

        self.send_pending()?;
        Ok(Poll::Pending)
    }

    fn receive(&mut self) -> Result<Option<u8>> {
        let available = self.transport.bytes_available_to_read()?;
        if available == 0 {
            return Ok(None);
        }

        let requested = available.min(self.read_buf.len());
        let received = self.transport.read(&mut self.read_buf[..requested])?;
        if received != requested {
            return Err(TransportError::ShortRead {
                requested,
                received,
            }
            .into());
        }
        self.rx_bytes += received as u64;

        self.events.clear();
        let fed = self.rx.feed(&self.read_buf[..received], &mut self.events);
        for event in self.events.drain(..) {
            self.observer.on_event(event)?;
        }
        fed?;
        Ok(self.rx.status())
    }

    /// Largest payload whose whole frame fits in `free` bytes.
    fn payload_budget(&self, free: usize) -> usize {
        let cap = self.codec.max_payload().min(self.config.max_frame_payload);
        let budget = free.saturating_sub(1).min(cap);
        if budget + self.codec.header_len(budget) <= free {
            budget
        } else {
            free.saturating_sub(self.codec.form().max_header_len())
                .min(cap)
        }
    }

    fn send_pending(&mut self) -> Result<()> {
        let Some(frame) = self.pending.as_ref() else {
            return Ok(());
        };
        let size = frame.wire_size(&self.codec);
        if self.transport.bytes_available_to_write()? < size {
            return Ok(());
        }

        self.write_buf.clear();
        frame.encode(&self.codec, &mut self.write_buf)?;
        let written = self.transport.write(&self.write_buf)?;
        if written != size {
            return Err(TransportError::ShortWrite {
                requested: size,
                written,
            }
            .into());
        }

        self.pending = None;
        self.tx_bytes += size as u64;
        self.frames_sent += 1;
        Ok(())
    }

    /// Poll until the device stops. Returns the FPGA_STOPPED status.
    pub fn run(&mut self) -> Result<u8> {
        loop {
            if let Poll::Stopped(status) = self.poll_once()? {
                return Ok(status);
            }
        }
    }

    /// Poll until the device stops or `cancelled` returns true.
    ///
    /// Returns `None` when cancelled.
    pub fn run_until(&mut self, mut cancelled: impl FnMut() -> bool) -> Result<Option<u8>> {
        loop {
            if let Poll::Stopped(status) = self.poll_once()? {
                return Ok(Some(status));
            }
            if cancelled() {
                return Ok(None);
            }
        }
    }

    /// Counters so far. Valid at any point, including after an error.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            transport: self.transport.transport_name(),
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            frames_sent: self.frames_sent,
            stream_bytes: self.tx.stream_bytes(),
            status: self.rx.status(),
            tx_state: self.tx.state().name(),
            rx_state: self.rx.state().name(),
        }
    }

    /// Frame waiting for write space, if any.
    pub fn pending_frame(&self) -> Option<&Frame> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn source(&self) -> &S {
        self.tx.source()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (T, S, O) {
        (self.transport, self.tx.into_source(), self.observer)
    }
}
