use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use pcmlink_frame::{encode_setup, CommandSet, HeaderCodec, OutputPort};
use pcmlink_session::{capture_file_name, render, PcmSource, RenderSummary};
use serde::Serialize;
use tracing::info;

use crate::cmd::{check_frame_fit, LinkArgs, RenderArgs};
use crate::exit::{frame_error, io_error, session_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{OutputFormat, Report};

#[derive(Serialize)]
struct RenderOutput<'a> {
    command: &'static str,
    file: String,
    output: String,
    form: &'static str,
    #[serde(flatten)]
    summary: &'a RenderSummary,
}

pub fn run(args: RenderArgs, link: &LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let port = OutputPort::new(args.port).map_err(|err| CliError::new(USAGE, err.to_string()))?;
    let source = PcmSource::open(&args.file, port)
        .map_err(|err| session_error(&format!("open {}", args.file.display()), err))?;
    let audio = *source.format();
    encode_setup(&audio, port).map_err(|err| frame_error("render", err))?;

    let form = link.form();
    let max_payload = args.max_payload.unwrap_or(usize::from(u16::MAX));
    check_frame_fit(form, audio.block_align(), max_payload, usize::MAX)?;

    let path = match args.output {
        Some(path) => path,
        None => PathBuf::from(
            capture_file_name(port, &audio).map_err(|err| session_error("render", err))?,
        ),
    };
    let file = File::create(&path)
        .map_err(|err| io_error(&format!("create {}", path.display()), err))?;

    info!(output = %path.display(), %audio, form = %form, "rendering command stream");
    let codec = HeaderCodec::new(form, CommandSet::Audio);
    let summary = render(source, codec, max_payload, BufWriter::new(file))
        .map_err(|err| session_error("render", err))?;

    let out = RenderOutput {
        command: "render",
        file: args.file.display().to_string(),
        output: path.display().to_string(),
        form: form.name(),
        summary: &summary,
    };
    Report::new("render", &out)
        .row("file", &out.file)
        .row("output", &out.output)
        .row("form", out.form)
        .row("frames", summary.frames)
        .row("bytes", summary.bytes)
        .row("stream bytes", summary.stream_bytes)
        .print(format);

    Ok(SUCCESS)
}
