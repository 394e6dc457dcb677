use pcmlink_frame::{encode_setup, CommandSet, OutputPort};
use pcmlink_session::{PcmSource, Session, SessionConfig, SessionReport, SimConfig};
use pcmlink_transport::DEFAULT_TX_CAPACITY;
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{check_frame_fit, finish, Cancel, LinkArgs, PlayArgs};
use crate::exit::{frame_error, session_error, CliError, CliResult, USAGE};
use crate::output::{status_text, OutputFormat, Report};

#[derive(Serialize)]
struct PlayOutput<'a> {
    command: &'static str,
    file: String,
    format: String,
    port: u8,
    interface: &'static str,
    #[serde(flatten)]
    session: &'a SessionReport,
}

pub fn run(args: PlayArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let port = OutputPort::new(args.port).map_err(|err| CliError::new(USAGE, err.to_string()))?;
    let source = PcmSource::open(&args.file, port)
        .map_err(|err| session_error(&format!("open {}", args.file.display()), err))?;
    let audio = *source.format();
    encode_setup(&audio, port).map_err(|err| frame_error("play", err))?;

    let form = link.form();
    let tx_capacity = link.tx_capacity.unwrap_or(DEFAULT_TX_CAPACITY);
    let max_payload = args.max_payload.unwrap_or(usize::from(u16::MAX));
    check_frame_fit(form, audio.block_align(), max_payload, tx_capacity)?;

    let transport = link.open(SimConfig {
        form,
        command_set: CommandSet::Audio,
        tx_capacity,
        ..SimConfig::default()
    })?;
    let mut cancel = Cancel::install(link)?;

    let config = SessionConfig {
        form,
        command_set: CommandSet::Audio,
        max_frame_payload: max_payload,
        ..SessionConfig::default()
    };
    info!(file = %args.file.display(), %audio, port = port.get(), "streaming");
    let mut session = Session::new(transport, source, config);
    let outcome = session.run_until(|| cancel.should_stop());
    let report = session.report();
    let status = outcome.map_err(|err| {
        warn!(tx_bytes = report.tx_bytes, stream_bytes = report.stream_bytes, "play aborted");
        session_error("play", err)
    })?;

    let out = PlayOutput {
        command: "play",
        file: args.file.display().to_string(),
        format: audio.to_string(),
        port: port.get(),
        interface: port.interface(),
        session: &report,
    };
    Report::new("play", &out)
        .row("file", &out.file)
        .row("format", &out.format)
        .row("port", format!("{} ({})", out.port, out.interface))
        .row("transport", report.transport)
        .row("frames sent", report.frames_sent)
        .row("stream bytes", report.stream_bytes)
        .row("tx bytes", report.tx_bytes)
        .row("rx bytes", report.rx_bytes)
        .row("status", status_text(report.status))
        .print(format);

    finish(status, &cancel, "play")
}
