mod cache;
mod cli;
mod config;
mod error;
mod filter;
mod logging;
mod output;
mod todoist;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use cache::{CacheLayer, CacheStatus, JsonFileStorage};
use error::CoreError;
use output::{Format, View};
use todoist::SyncClient;

#[derive(Parser, Debug)]
#[command(name = "todoist")]
#[command(about = "Todoist CLI client with a local sync cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/todoist/config.yaml)
  #[arg(long)]
  config: Option<PathBuf>,

  /// Output with header
  #[arg(long)]
  header: bool,

  /// Colorize output
  #[arg(long)]
  color: bool,

  /// Output in CSV format
  #[arg(long)]
  csv: bool,

  /// Also write logs to stderr
  #[arg(long)]
  debug: bool,

  /// Display parent tasks like a namespace
  #[arg(long)]
  namespace: bool,

  /// Display subtasks with indent
  #[arg(long)]
  indent: bool,

  /// Display parent projects like a namespace
  #[arg(long)]
  project_namespace: bool,

  #[command(subcommand)]
  command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config::data_dir()?, args.debug)?;

  let client = SyncClient::new(config.api_url()?, config.api_token()?, config.timeout())?;
  let storage = JsonFileStorage::new(config.cache_path()?);
  tracing::debug!(path = %storage.path().display(), "using cache file");
  let (mut layer, status) = CacheLayer::open(client, storage)?;
  if status == CacheStatus::Discarded {
    eprintln!(
      "warning: the local cache was unreadable and has been discarded; \
       a full sync will rebuild it"
    );
  }

  let view = View {
    format: if args.csv { Format::Csv } else { Format::Columns },
    header: args.header,
    color: args.color || config.color,
    indent: args.indent,
    namespace: args.namespace,
    project_namespace: args.project_namespace,
  };

  let mut out = std::io::stdout().lock();
  if let Err(report) = cli::run(args.command, &mut layer, &view, &mut out).await {
    if report
      .downcast_ref::<CoreError>()
      .is_some_and(CoreError::is_recoverable)
    {
      eprintln!("temporary failure; retrying the command may succeed");
    }
    return Err(report);
  }

  Ok(())
}
