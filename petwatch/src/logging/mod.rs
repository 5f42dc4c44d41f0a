//! Logging setup with local-timezone timestamps and an optional file
//! appender.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "petwatch=info,bili_api=info";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize the global subscriber. When `log_dir` is given, logs are also
/// written to a daily-rotated file; the returned guard must be kept alive
/// for the writer thread to flush.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console_layer = fmt::layer().with_timer(LocalTimer);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "petwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimer);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(console_layer.and_then(file_layer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(console_layer)
                .init();
            None
        }
    }
}
