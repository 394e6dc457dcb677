//! Command-stream capture for HDL simulation.
//!
//! Instead of talking to a device, the TX framer is run to completion and
//! every frame byte is written out. The resulting file is what the FPGA
//! would have received, ready to feed into a testbench.

use std::io::Write;

use bytes::BytesMut;
use pcmlink_frame::{
    AudioFormat, BitDepth, FrameError, HeaderCodec, OutputPort, SampleRate, StreamSource,
    TxFramer,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;

/// Totals of a rendered command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub frames: u64,
    pub bytes: u64,
    pub stream_bytes: u64,
}

/// Default capture file name: `{i2s|spdif}_{rate}_{depth}.bin`.
pub fn capture_file_name(port: OutputPort, format: &AudioFormat) -> Result<String> {
    let rate = SampleRate::from_hz(format.sample_rate)?;
    let depth = BitDepth::from_bits(format.bits_per_sample)?;
    let bits = depth
        .bits()
        .ok_or(FrameError::UnsupportedBitDepth(format.bits_per_sample))?;
    Ok(format!("{}_{}_{}.bin", port.interface(), rate.hz(), bits))
}

/// Run `source` through a TX framer and write every frame to `out`.
///
/// Stream frames carry up to `max_payload` bytes (capped by the form).
pub fn render<S, W>(
    source: S,
    codec: HeaderCodec,
    max_payload: usize,
    mut out: W,
) -> Result<RenderSummary>
where
    S: StreamSource,
    W: Write,
{
    let budget = max_payload.min(codec.max_payload());
    let mut tx = TxFramer::new(source, codec);
    let mut buf = BytesMut::new();
    let mut bytes = 0u64;

    while !tx.is_done() {
        let before = tx.state();
        match tx.next_frame(budget)? {
            Some(frame) => {
                buf.clear();
                frame.encode(&codec, &mut buf)?;
                out.write_all(&buf)?;
                bytes += buf.len() as u64;
            }
            None if tx.state() == before => {
                // No progress possible: the source needs more than the budget.
                return Err(FrameError::FrameTooLarge {
                    requested: tx.source().min_chunk(),
                    max: budget,
                }
                .into());
            }
            None => debug!(state = tx.state().name(), "render state change"),
        }
    }
    out.flush()?;

    let summary = RenderSummary {
        frames: tx.frames_produced(),
        bytes,
        stream_bytes: tx.stream_bytes(),
    };
    info!(
        frames = summary.frames,
        bytes = summary.bytes,
        stream_bytes = summary.stream_bytes,
        "command stream rendered"
    );
    Ok(summary)
}
