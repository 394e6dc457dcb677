use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Crates whose events follow `--log-level`. Everything else stays at warn.
const LINK_TARGETS: [&str; 3] = ["pcmlink", "pcmlink_session", "pcmlink_transport"];

/// Per-byte RX and per-frame TX events live here.
const FRAME_TARGET: &str = "pcmlink_frame";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Target filter: the framing crate is held at debug unless `trace_frames`.
fn link_targets(level: LogLevel, trace_frames: bool) -> Targets {
    let level = level.as_filter();
    let frame_level = if trace_frames {
        LevelFilter::TRACE
    } else {
        level.min(LevelFilter::DEBUG)
    };
    LINK_TARGETS
        .iter()
        .fold(
            Targets::new().with_default(level.min(LevelFilter::WARN)),
            |targets, target| targets.with_target(*target, level),
        )
        .with_target(FRAME_TARGET, frame_level)
}

/// Logs always go to stderr; stdout is reserved for reports.
pub fn init_logging(format: LogFormat, level: LogLevel, trace_frames: bool) {
    let targets = link_targets(level, trace_frames);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_target(matches!(level, LogLevel::Debug | LogLevel::Trace) || trace_frames);

    match format {
        LogFormat::Text => {
            let _ = builder.finish().with(targets).try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().finish().with(targets).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_crates_follow_level() {
        let targets = link_targets(LogLevel::Info, false);
        assert!(targets.would_enable("pcmlink_session::driver", &Level::INFO));
        assert!(targets.would_enable("pcmlink::cmd::play", &Level::INFO));
        assert!(!targets.would_enable("pcmlink_transport::device", &Level::DEBUG));
    }

    #[test]
    fn frame_crate_needs_trace_frames_for_trace() {
        let targets = link_targets(LogLevel::Trace, false);
        assert!(targets.would_enable("pcmlink_frame::rx", &Level::DEBUG));
        assert!(!targets.would_enable("pcmlink_frame::rx", &Level::TRACE));
        assert!(targets.would_enable("pcmlink_session::observer", &Level::TRACE));

        let targets = link_targets(LogLevel::Info, true);
        assert!(targets.would_enable("pcmlink_frame::rx", &Level::TRACE));
    }

    #[test]
    fn other_crates_capped_at_warn() {
        let targets = link_targets(LogLevel::Debug, false);
        assert!(!targets.would_enable("hound", &Level::INFO));
        assert!(targets.would_enable("hound", &Level::WARN));

        let quiet = link_targets(LogLevel::Error, false);
        assert!(!quiet.would_enable("hound", &Level::WARN));
        assert!(!quiet.would_enable("pcmlink_frame::tx", &Level::WARN));
    }
}
