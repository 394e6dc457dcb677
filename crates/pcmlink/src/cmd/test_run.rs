use pcmlink_frame::{CommandSet, TestSetup};
use pcmlink_session::{
    Echo, SequenceVerifier, Session, SessionConfig, SessionReport, SimConfig, TestPattern,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{check_frame_fit, finish, Cancel, LinkArgs, TestArgs};
use crate::exit::{session_error, CliResult};
use crate::output::{status_text, OutputFormat, Report};

/// Outbound window of the test core build.
const TEST_TX_CAPACITY: usize = 512;

#[derive(Serialize)]
struct TestOutput<'a> {
    command: &'static str,
    test_number: u8,
    payload_length: u8,
    packet_count: u8,
    packets_sent: u8,
    verified_bytes: u64,
    loopback_bytes: u64,
    #[serde(flatten)]
    session: &'a SessionReport,
}

pub fn run(args: TestArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let setup = TestSetup {
        test_number: args.test_number,
        payload_length: args.payload_length,
        packet_count: args.count,
    };
    let host_driven = matches!(setup.test_number, 0 | 1);

    let form = link.form();
    let tx_capacity = link.tx_capacity.unwrap_or(TEST_TX_CAPACITY);
    if host_driven && setup.packet_count > 0 {
        check_frame_fit(
            form,
            usize::from(setup.payload_length),
            usize::MAX,
            tx_capacity,
        )?;
    }

    let transport = link.open(SimConfig {
        form,
        command_set: CommandSet::Test,
        tx_capacity,
        echo: if host_driven { Echo::Data } else { Echo::None },
        ..SimConfig::default()
    })?;
    let mut cancel = Cancel::install(link)?;

    let config = SessionConfig {
        form,
        command_set: CommandSet::Test,
        ..SessionConfig::default()
    };
    info!(
        test = setup.test_number,
        payload_length = setup.payload_length,
        packet_count = setup.packet_count,
        "starting test"
    );
    let mut session = Session::with_observer(
        transport,
        TestPattern::new(setup),
        SequenceVerifier::new(),
        config,
    );
    let outcome = session.run_until(|| cancel.should_stop());
    let report = session.report();
    let status = outcome.map_err(|err| {
        warn!(
            verified_bytes = session.observer().verified(),
            tx_bytes = report.tx_bytes,
            "test aborted"
        );
        session_error("test", err)
    })?;

    let out = TestOutput {
        command: "test",
        test_number: setup.test_number,
        payload_length: setup.payload_length,
        packet_count: setup.packet_count,
        packets_sent: session.source().packets_sent(),
        verified_bytes: session.observer().verified(),
        loopback_bytes: session.observer().loopback_bytes(),
        session: &report,
    };
    Report::new("test", &out)
        .row("test", out.test_number)
        .row(
            "packets sent",
            format!("{} of {}", out.packets_sent, out.packet_count),
        )
        .row("payload length", out.payload_length)
        .row("verified bytes", out.verified_bytes)
        .row("loopback bytes", out.loopback_bytes)
        .row("transport", report.transport)
        .row("tx bytes", report.tx_bytes)
        .row("rx bytes", report.rx_bytes)
        .row("status", status_text(report.status))
        .print(format);

    finish(status, &cancel, "test")
}
