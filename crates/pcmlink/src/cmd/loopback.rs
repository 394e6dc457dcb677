use pcmlink_session::{Echo, LoopbackConfig, LoopbackReport, RawLoopback, SimConfig};
use pcmlink_transport::DEFAULT_TX_CAPACITY;
use serde::Serialize;
use tracing::info;

use crate::cmd::{Cancel, LinkArgs, LoopbackArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{OutputFormat, Report};

#[derive(Serialize)]
struct LoopbackOutput<'a> {
    command: &'static str,
    packet_bytes: usize,
    packet_count: usize,
    #[serde(flatten)]
    loopback: &'a LoopbackReport,
}

pub fn run(args: LoopbackArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let tx_capacity = link.tx_capacity.unwrap_or(DEFAULT_TX_CAPACITY);
    if args.packet_bytes > tx_capacity {
        return Err(CliError::new(
            USAGE,
            format!(
                "{}-byte packets do not fit a {tx_capacity}-byte TX FIFO",
                args.packet_bytes
            ),
        ));
    }

    let transport = link.open(SimConfig {
        tx_capacity,
        echo: Echo::Raw,
        ..SimConfig::default()
    })?;
    let mut cancel = Cancel::install(link)?;

    let config = LoopbackConfig {
        packet_bytes: args.packet_bytes,
        packet_count: args.count,
        ..LoopbackConfig::default()
    };
    info!(
        packet_bytes = config.packet_bytes,
        packet_count = config.packet_count,
        "starting loopback"
    );
    let mut loopback = RawLoopback::new(transport, config);
    let report = loopback
        .run_until(|| cancel.should_stop())
        .map_err(|err| session_error("loopback", err))?;

    let out = LoopbackOutput {
        command: "loopback",
        packet_bytes: config.packet_bytes,
        packet_count: config.packet_count,
        loopback: &report,
    };
    Report::new("loopback", &out)
        .row("packets sent", format!("{} of {}", report.packets_sent, out.packet_count))
        .row("packet bytes", out.packet_bytes)
        .row("tx bytes", report.tx_bytes)
        .row("rx bytes", format!("{} of {}", report.rx_bytes, report.expected_bytes))
        .row("complete", report.complete)
        .print(format);

    if report.complete {
        Ok(SUCCESS)
    } else {
        Err(cancel.error("loopback"))
    }
}
