use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand, ValueEnum};
use pcmlink_frame::ProtocolForm;
use pcmlink_session::{SimConfig, SimulatedFpga};
use pcmlink_transport::Transport;
use tracing::info;

use crate::exit::{
    transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::OutputFormat;

pub mod loopback;
pub mod play;
pub mod render;
pub mod test_run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a WAV file to the audio core.
    Play(PlayArgs),
    /// Run a test-core session and verify the data the device returns.
    Test(TestArgs),
    /// Unframed loopback of an incrementing byte pattern.
    Loopback(LoopbackArgs),
    /// Write the command stream for a WAV file to disk (HDL simulation input).
    Render(RenderArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, link: LinkArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Play(args) => play::run(args, &link, format),
        Command::Test(args) => test_run::run(args, &link, format),
        Command::Loopback(args) => loopback::run(args, &link, format),
        Command::Render(args) => render::run(args, &link, format),
        Command::Version(args) => version::run(args),
    }
}

/// Header layout, as accepted on the command line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FormArg {
    #[default]
    Narrow,
    Wide,
    WideExtended,
}

impl From<FormArg> for ProtocolForm {
    fn from(value: FormArg) -> Self {
        match value {
            FormArg::Narrow => ProtocolForm::Narrow,
            FormArg::Wide => ProtocolForm::Wide,
            FormArg::WideExtended => ProtocolForm::WideExtended,
        }
    }
}

/// Link options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// FIFO device node.
    #[arg(long, value_name = "PATH", env = "PCMLINK_DEVICE", global = true)]
    pub device: Option<PathBuf>,

    /// Talk to a simulated device instead of hardware.
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Status the simulated device reports when it stops.
    #[arg(long, value_name = "STATUS", default_value = "0", global = true)]
    pub sim_status: u8,

    /// Command header layout of the FPGA build.
    #[arg(long, value_enum, default_value = "narrow", global = true)]
    pub form: FormArg,

    /// Outbound FIFO size in bytes (defaults per command).
    #[arg(long, value_name = "BYTES", global = true)]
    pub tx_capacity: Option<usize>,

    /// Give up after this long (e.g. 30s, 500ms).
    #[arg(long, value_name = "DURATION", global = true)]
    pub timeout: Option<String>,
}

impl LinkArgs {
    pub fn form(&self) -> ProtocolForm {
        self.form.into()
    }

    /// Open the device, or build a simulator from `sim`.
    pub fn open(&self, sim: SimConfig) -> CliResult<Box<dyn Transport>> {
        if self.simulate {
            info!(form = %sim.form, tx_capacity = sim.tx_capacity, "using simulated device");
            return Ok(Box::new(SimulatedFpga::new(SimConfig {
                stop_status: self.sim_status,
                ..sim
            })));
        }
        let Some(path) = self.device.as_ref() else {
            return Err(CliError::new(
                USAGE,
                "no device given (use --device, PCMLINK_DEVICE or --simulate)",
            ));
        };
        open_device(path, sim.tx_capacity)
    }
}

#[cfg(unix)]
fn open_device(path: &std::path::Path, tx_capacity: usize) -> CliResult<Box<dyn Transport>> {
    let device = pcmlink_transport::FifoDevice::open_with_capacity(path, tx_capacity)
        .map_err(|err| transport_error("open device", err))?;
    Ok(Box::new(device))
}

#[cfg(not(unix))]
fn open_device(path: &std::path::Path, _tx_capacity: usize) -> CliResult<Box<dyn Transport>> {
    Err(CliError::new(
        crate::exit::TRANSPORT_ERROR,
        format!(
            "device access is not supported on this platform: {}",
            path.display()
        ),
    ))
}

/// Why a run loop was asked to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    TimedOut,
}

/// Ctrl-C and `--timeout`, checked once per poll.
pub struct Cancel {
    running: Arc<AtomicBool>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    reason: Option<StopReason>,
}

impl Cancel {
    pub fn install(link: &LinkArgs) -> CliResult<Self> {
        let timeout = link.timeout.as_deref().map(parse_duration).transpose()?;
        let running = Arc::new(AtomicBool::new(true));
        install_ctrlc_handler(running.clone())?;
        Ok(Self {
            running,
            deadline: timeout.map(|t| Instant::now() + t),
            timeout,
            reason: None,
        })
    }

    pub fn should_stop(&mut self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            self.reason = Some(StopReason::Interrupted);
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            self.reason = Some(StopReason::TimedOut);
        }
        self.reason.is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason
    }

    /// Error for a run that ended without the device stopping.
    pub fn error(&self, context: &str) -> CliError {
        match (self.reason, self.timeout) {
            (Some(StopReason::TimedOut), Some(timeout)) => CliError::new(
                TIMEOUT,
                format!("{context}: timed out after {timeout:?}"),
            ),
            _ => CliError::new(FAILURE, format!("{context}: interrupted")),
        }
    }
}

/// Exit code for a finished run: the device status, or why there is none.
pub fn finish(status: Option<u8>, cancel: &Cancel, context: &str) -> CliResult<i32> {
    match status {
        Some(0) => Ok(SUCCESS),
        Some(code) => Err(CliError::new(
            FAILURE,
            format!("{context}: device stopped with status {code}"),
        )),
        None => Err(cancel.error(context)),
    }
}

/// Stream frames must fit both the per-frame cap and the TX FIFO.
pub fn check_frame_fit(
    form: ProtocolForm,
    min_chunk: usize,
    max_payload: usize,
    tx_capacity: usize,
) -> CliResult<()> {
    if min_chunk > max_payload.min(form.max_payload()) {
        return Err(CliError::new(
            USAGE,
            format!(
                "{min_chunk}-byte payload exceeds the frame limit ({} bytes, {form} form)",
                max_payload.min(form.max_payload())
            ),
        ));
    }
    if min_chunk + form.max_header_len() > tx_capacity {
        return Err(CliError::new(
            USAGE,
            format!("{min_chunk}-byte payload does not fit a {tx_capacity}-byte TX FIFO"),
        ));
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// WAV file to stream (stereo, 16/24/32 bit).
    pub file: PathBuf,
    /// Output port (0 and 1 are I2S, 2 and 3 are S/PDIF).
    #[arg(long, short = 'p', default_value = "0")]
    pub port: u8,
    /// Cap on STREAM_OUTPUT payload per frame.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Test number. 0 and 1 stream from the host; others are device-driven.
    #[arg(long = "test", short = 't', default_value = "1")]
    pub test_number: u8,
    /// Bytes per DATA packet.
    #[arg(long, default_value = "16")]
    pub payload_length: u8,
    /// Number of DATA packets.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: u8,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Bytes per packet.
    #[arg(long, default_value = "512")]
    pub packet_bytes: usize,
    /// Number of packets.
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// WAV file to render.
    pub file: PathBuf,
    /// Output port (0 and 1 are I2S, 2 and 3 are S/PDIF).
    #[arg(long, short = 'p', default_value = "0")]
    pub port: u8,
    /// Output file. Default: `{i2s|spdif}_{rate}_{bits}.bin` in the current directory.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// Cap on STREAM_OUTPUT payload per frame.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
