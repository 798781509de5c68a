use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

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

/// Crates whose events follow `--log-level`; everything else stays at warn.
const NXTLINK_TARGETS: [&str; 5] = [
    "nxtlink",
    "nxtlink_transport",
    "nxtlink_frame",
    "nxtlink_proto",
    "nxtlink_service",
];

fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    NXTLINK_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Logs go to stderr so stdout stays machine-readable. Thread names are
/// kept since session, client and poller work each run on their own thread.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);
    let registry = tracing_subscriber::registry().with(targets(level));

    match format {
        LogFormat::Text => {
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Json => {
            let _ = registry.with(layer.json()).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn wire_traffic_follows_log_level() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("nxtlink_frame::reader", &Level::TRACE));
        assert!(filter.would_enable("nxtlink_service::session", &Level::DEBUG));
    }

    #[test]
    fn other_crates_stay_at_warn() {
        let filter = targets(LogLevel::Debug);
        assert!(!filter.would_enable("mio::poll", &Level::DEBUG));
        assert!(filter.would_enable("mio::poll", &Level::WARN));

        let quiet = targets(LogLevel::Error);
        assert!(!quiet.would_enable("mio::poll", &Level::WARN));
        assert!(!quiet.would_enable("nxtlink_service", &Level::WARN));
    }
}
