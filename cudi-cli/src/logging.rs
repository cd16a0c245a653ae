use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "cudi.log";

/// Log to stderr and to a daily-rolling file in `log_dir`.
///
/// Keep the returned guard alive until exit so buffered file output is
/// flushed. Falls back to stderr only if `log_dir` cannot be created.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    if let Err(e) = std::fs::create_dir_all(log_dir) {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        tracing::warn!(error = %e, dir = %log_dir.display(), "File logging disabled");
        return None;
    }

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Some(guard)
}
