//! Tracing setup.
//!
//! Level comes from `WYRONIX_LOG`, then `RUST_LOG`, defaulting to `warn`. The TUI owns
//! the terminal, so in that mode events go to a daily rolling file instead of stderr.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "WYRONIX_LOG";

pub enum LogTarget {
    Stderr,
    File,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber. Keep the returned guard alive until exit so the
/// file writer flushes.
pub fn init(target: LogTarget) -> Option<WorkerGuard> {
    match target {
        LogTarget::Stderr => {
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .try_init();
            None
        }
        LogTarget::File => {
            let dir = crate::storage::logs_dir();
            if std::fs::create_dir_all(&dir).is_err() {
                return None;
            }
            let appender = tracing_appender::rolling::daily(dir, "wyronix.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init();
            Some(guard)
        }
    }
}
