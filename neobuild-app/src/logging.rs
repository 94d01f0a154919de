use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "neobuild.log";

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`. When `directory` is
/// given, logs are also written to a daily rolling file there; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init_logging(default_level: &str, directory: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false);
            let result = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            if let Err(e) = result {
                eprintln!("Failed to initialize logging: {e}");
            }
            Some(guard)
        }
        None => {
            if let Err(e) = tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
            {
                eprintln!("Failed to initialize logging: {e}");
            }
            None
        }
    }
}
