//! Log setup. Logs go to `<data dir>/todoist/todoist.log`; `--debug` also
//! mirrors them to stderr.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "todoist.log";

/// Install the global subscriber. The returned guard flushes the file
/// writer when dropped and must be held until exit.
pub fn init(log_dir: &Path, debug: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let file_layer = fmt::layer()
    .with_writer(writer)
    .with_ansi(false)
    .with_target(false);

  let stderr_layer = debug.then(|| {
    fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
      .without_time()
      .boxed()
  });

  tracing_subscriber::registry()
    .with(env_filter(debug))
    .with(file_layer)
    .with(stderr_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn env_filter(debug: bool) -> EnvFilter {
  let default = if debug { "todoist=debug" } else { "todoist=info" };
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
