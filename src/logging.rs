//! Tracing subscriber setup for the server and the model tools.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "agri-yield.log";

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Full logging for the long-running server.
///
/// `RUST_LOG` overrides `config.level`. When `config.dir` is set, a daily
/// rolling file is added; the returned guard must be held until exit so the
/// file writer flushes.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = env_filter(&config.level);

    let (file_layer, guard) = match config.dir.as_deref().and_then(file_writer) {
        Some((writer, guard)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();

    if file_logging_enabled {
        tracing::info!(dir = ?config.dir, "File logging enabled");
    }
    guard
}

/// Open a daily rolling appender in `dir`, or `None` if it is not writable.
///
/// `rolling::daily` panics when it cannot create its first file, so
/// writability is checked up front.
fn file_writer(
    dir: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "Warning: Could not create log directory {} ({}), file logging disabled",
            dir.display(),
            e
        );
        return None;
    }

    let test_path = dir.join(".agri_yield_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            Some(tracing_appender::non_blocking(appender))
        }
        Err(e) => {
            eprintln!(
                "Warning: Could not write to log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            None
        }
    }
}

/// Console-only logging for one-shot commands.
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_target(false)
        .try_init();
}
