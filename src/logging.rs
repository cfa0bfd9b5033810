//! Tracing setup: stdout for interactive runs plus a daily-rolling file
//! under the data directory.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::AppPaths;

const LOG_FILE_PREFIX: &str = "studypal.log";

// Dropping the guard loses buffered log lines; keep it for the process
// lifetime.
static WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn default_filter() -> EnvFilter {
    // sqlx logs every statement at info; keep it quiet unless asked for.
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"))
}

/// Install the global subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(paths: &AppPaths) {
    let _ = std::fs::create_dir_all(&paths.log_dir);

    let appender = tracing_appender::rolling::daily(&paths.log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    let _ = WRITER_GUARD.set(guard);

    let subscriber = tracing_subscriber::registry()
        .with(default_filter())
        .with(tracing_subscriber::fmt::layer().compact())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
