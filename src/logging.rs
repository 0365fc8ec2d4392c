//! Tracing setup: terminal output plus daily-rotated files under the
//! crawler's logs/ directory.
//!
//! `RUST_LOG` controls filtering (default "info"), e.g.
//! `RUST_LOG=crawlcore=debug,sled=warn`.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the global subscriber. Call once, before the crawler runs.
pub fn init_logging<P: AsRef<Path>>(log_dir: P) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "crawler.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let json_appender = tracing_appender::rolling::daily(log_dir, "crawler.json.log");
    let (json_writer, json_guard) = tracing_appender::non_blocking(json_appender);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .compact()
        .with_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
        );

    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_target(true)
        .with_thread_names(true)
        .with_filter(
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
        );

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(json_layer)
        .try_init()?;

    // The writer guards must outlive the process or buffered lines are
    // lost on exit.
    Box::leak(Box::new(file_guard));
    Box::leak(Box::new(json_guard));

    tracing::debug!("logging to {}", log_dir.display());
    Ok(())
}
