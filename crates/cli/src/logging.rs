//! Tracing initialization for the CLI.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> tracing_subscriber::EnvFilter {
  tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// Console-only logging.
pub fn init() {
  tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// Console plus a daily-rolling log file for long-running use.
///
/// Returns the guard that must be kept alive for the duration of the
/// program; dropping it stops the background writer.
pub fn init_with_file(log_dir: &Path) -> Option<WorkerGuard> {
  if std::fs::create_dir_all(log_dir).is_err() {
    init();
    return None;
  }

  let file_appender = tracing_appender::rolling::daily(log_dir, "tether.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let console_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(true);
  let file_layer = tracing_subscriber::fmt::layer()
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer);

  tracing_subscriber::registry()
    .with(env_filter())
    .with(console_layer)
    .with(file_layer)
    .init();

  Some(guard)
}
