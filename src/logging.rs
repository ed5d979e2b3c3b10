//! Structured logging setup
//!
//! Provides logging with:
//! - JSON output for machine consumption
//! - Pretty formatting for interactive runs
//! - A daily-rolling log file, the console, or both
//! - `RUST_LOG` taking precedence over the configured level
//!
//! Library code only emits `tracing` events; the subscriber is installed once
//! by the binary.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "stackdump-loader.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the whole process. Console-only logging returns `None`.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let json = config.format == "json";

    match config.output.as_str() {
        "file" => {
            let (writer, guard) = file_writer(log_dir)?;
            let registry = tracing_subscriber::registry().with(filter);
            let installed = if json {
                registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_current_span(true)
                            .with_span_list(true),
                    )
                    .try_init()
            } else {
                registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .try_init()
            };
            installed.context("Failed to install log subscriber")?;
            Ok(Some(guard))
        }
        "both" => {
            let (writer, guard) = file_writer(log_dir)?;
            let registry = tracing_subscriber::registry().with(filter);
            let installed = if json {
                registry
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .with(fmt::layer().json().with_writer(writer))
                    .try_init()
            } else {
                registry
                    .with(fmt::layer().pretty().with_writer(std::io::stderr))
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init()
            };
            installed.context("Failed to install log subscriber")?;
            Ok(Some(guard))
        }
        _ => {
            let registry = tracing_subscriber::registry().with(filter);
            let installed = if json {
                registry
                    .with(
                        fmt::layer()
                            .json()
                            .with_writer(std::io::stderr)
                            .with_current_span(true)
                            .with_span_list(true)
                            .with_target(true),
                    )
                    .try_init()
            } else {
                registry
                    .with(
                        fmt::layer()
                            .with_writer(std::io::stderr)
                            .with_target(true)
                            .with_ansi(true)
                            .with_span_events(FmtSpan::CLOSE)
                            .pretty(),
                    )
                    .try_init()
            };
            installed.context("Failed to install log subscriber")?;
            Ok(None)
        }
    }
}

fn file_writer(
    log_dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
