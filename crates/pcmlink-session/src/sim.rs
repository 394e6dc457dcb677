//! A software stand-in for the FPGA end of the link.
//!
//! [`SimulatedFpga`] implements [`Transport`], so a session can run against
//! it exactly as against hardware. It parses host frames, checks the setup,
//! optionally echoes stream payload, and answers STOP with FPGA_STOPPED.

use std::collections::VecDeque;

use bytes::BytesMut;
use pcmlink_frame::{
    decode_setup, CommandKind, CommandSet, Direction, Frame, HeaderCodec, ProtocolForm,
    SetupPayload, TestSetup,
};
use pcmlink_transport::{Result, Transport};
use tracing::{debug, info, warn};

/// Status sent when the setup payload is rejected.
pub const STATUS_SETUP_REJECTED: u8 = 0xfe;
/// Status sent when the host stream cannot be parsed.
pub const STATUS_BAD_COMMAND: u8 = 0xff;

/// What the simulated device sends back for host stream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Echo {
    /// Consume payload silently.
    #[default]
    None,
    /// Echo payload as FPGA_DATA frames.
    Data,
    /// Echo payload as FPGA_LOOPBACK frames.
    Loopback,
    /// Unframed loopback: every byte written is read back as-is.
    Raw,
}

/// Simulated device configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub form: ProtocolForm,
    pub command_set: CommandSet,
    /// Host->device FIFO size in bytes.
    pub tx_capacity: usize,
    /// Bytes the device drains from its FIFO per poll; `None` drains all.
    pub drain_per_poll: Option<usize>,
    /// Largest read availability reported at once; `None` reports all.
    pub read_chunk: Option<usize>,
    pub echo: Echo,
    /// Status byte answered to STOP.
    pub stop_status: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            form: ProtocolForm::default(),
            command_set: CommandSet::default(),
            tx_capacity: pcmlink_transport::DEFAULT_TX_CAPACITY,
            drain_per_poll: None,
            read_chunk: None,
            echo: Echo::default(),
            stop_status: 0,
        }
    }
}

/// In-process FPGA model.
#[derive(Debug)]
pub struct SimulatedFpga {
    config: SimConfig,
    codec: HeaderCodec,
    /// Written by the host, not yet drained by the device.
    fifo: VecDeque<u8>,
    /// Drained bytes waiting for a complete frame.
    parse: BytesMut,
    /// Device -> host bytes.
    outbound: VecDeque<u8>,
    setup: Option<SetupPayload>,
    test_setup: Option<TestSetup>,
    stream_bytes: u64,
    frames: u64,
    stopped: bool,
}

impl SimulatedFpga {
    pub fn new(config: SimConfig) -> Self {
        let codec = HeaderCodec::new(config.form, config.command_set);
        Self {
            config,
            codec,
            fifo: VecDeque::new(),
            parse: BytesMut::new(),
            outbound: VecDeque::new(),
            setup: None,
            test_setup: None,
            stream_bytes: 0,
            frames: 0,
            stopped: false,
        }
    }

    /// Audio setup accepted by the device, if any.
    pub fn setup(&self) -> Option<SetupPayload> {
        self.setup
    }

    /// Test START payload accepted by the device, if any.
    pub fn test_setup(&self) -> Option<TestSetup> {
        self.test_setup
    }

    /// Stream payload bytes received.
    pub fn stream_bytes(&self) -> u64 {
        self.stream_bytes
    }

    /// Host frames parsed.
    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn service(&mut self) {
        let n = self
            .config
            .drain_per_poll
            .map_or(self.fifo.len(), |cap| cap.min(self.fifo.len()));
        if n == 0 {
            return;
        }
        let drained: Vec<u8> = self.fifo.drain(..n).collect();

        if self.config.echo == Echo::Raw {
            self.outbound.extend(drained);
            return;
        }
        if self.stopped {
            return;
        }

        self.parse.extend_from_slice(&drained);
        loop {
            match self.codec.decode_frame(Direction::HostToDevice, &mut self.parse) {
                Ok(Some(frame)) => {
                    self.frames += 1;
                    self.handle(frame);
                    if self.stopped {
                        self.parse.clear();
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "simulated device rejected host stream");
                    self.stop(STATUS_BAD_COMMAND);
                    self.parse.clear();
                    return;
                }
            }
        }
    }

    fn handle(&mut self, frame: Frame) {
        debug!(kind = %frame.kind, length = frame.payload.len(), "simulated device frame");
        match frame.kind {
            CommandKind::SetupOutput => self.handle_setup(&frame),
            CommandKind::StreamOutput => {
                self.stream_bytes += frame.payload.len() as u64;
                let echo = match self.config.echo {
                    Echo::Data => Some(CommandKind::FpgaData),
                    Echo::Loopback => Some(CommandKind::FpgaLoopback),
                    Echo::None | Echo::Raw => None,
                };
                if let Some(kind) = echo {
                    self.send(kind, &frame.payload);
                }
            }
            CommandKind::Stop => {
                let status = self.config.stop_status;
                self.stop(status);
            }
            other => {
                warn!(kind = %other, "device command received from host");
                self.stop(STATUS_BAD_COMMAND);
            }
        }
    }

    fn handle_setup(&mut self, frame: &Frame) {
        match self.config.command_set {
            CommandSet::Audio => match decode_setup(&frame.payload) {
                Ok(setup) if setup.depth.bits().is_some() => {
                    info!(
                        depth = ?setup.depth,
                        rate = setup.rate.hz(),
                        port = setup.port.get(),
                        "simulated device configured"
                    );
                    self.setup = Some(setup);
                }
                Ok(_) | Err(_) => self.stop(STATUS_SETUP_REJECTED),
            },
            CommandSet::Test => match TestSetup::from_bytes(&frame.payload) {
                Ok(setup) => {
                    info!(
                        test = setup.test_number,
                        payload_length = setup.payload_length,
                        packet_count = setup.packet_count,
                        "simulated test started"
                    );
                    self.test_setup = Some(setup);
                    if !matches!(setup.test_number, 0 | 1) {
                        self.generate(setup);
                    }
                }
                Err(_) => self.stop(STATUS_SETUP_REJECTED),
            },
        }
    }

    /// Device-driven test: emit the counting pattern as FPGA_DATA, then stop.
    fn generate(&mut self, setup: TestSetup) {
        let mut value = 0u8;
        let mut packet = Vec::with_capacity(usize::from(setup.payload_length));
        for _ in 0..setup.packet_count {
            packet.clear();
            for _ in 0..setup.payload_length {
                packet.push(value);
                value = value.wrapping_add(1);
            }
            self.send(CommandKind::FpgaData, &packet);
        }
        let status = self.config.stop_status;
        self.stop(status);
    }

    fn send(&mut self, kind: CommandKind, payload: &[u8]) {
        let mut buf = BytesMut::new();
        for chunk in payload.chunks(self.codec.max_payload().max(1)) {
            if Frame::new(kind, chunk.to_vec())
                .encode(&self.codec, &mut buf)
                .is_err()
            {
                return;
            }
        }
        self.outbound.extend(&buf[..]);
    }

    fn stop(&mut self, status: u8) {
        if self.stopped {
            return;
        }
        info!(status, "simulated device stopped");
        self.send(CommandKind::FpgaStopped, &[status]);
        self.stopped = true;
    }
}

impl Transport for SimulatedFpga {
    fn bytes_available_to_read(&mut self) -> Result<usize> {
        self.service();
        let available = self.outbound.len();
        Ok(self
            .config
            .read_chunk
            .map_or(available, |cap| available.min(cap)))
    }

    fn bytes_available_to_write(&mut self) -> Result<usize> {
        Ok(self.config.tx_capacity.saturating_sub(self.fifo.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.outbound.len());
        for (dst, src) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let free = self.config.tx_capacity.saturating_sub(self.fifo.len());
        let n = buf.len().min(free);
        self.fifo.extend(&buf[..n]);
        Ok(n)
    }

    fn transport_name(&self) -> &'static str {
        "simulated"
    }
}
