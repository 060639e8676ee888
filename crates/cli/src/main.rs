//! tether - keeps local directory trees continuously replicated onto a
//! remote agent over the agent's stdin/stdout.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tether_backend::{Engine, actor::TracingStatusSink, launch::CommandLauncher};
use tether_core::Config;

mod logging;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Continuous replication of local trees onto a remote agent")]
struct Cli {
  /// Path to the config file
  #[arg(short, long, default_value = "tether.toml")]
  config: PathBuf,

  /// Also write logs to this directory (daily rotation)
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the sync engine (default)
  Run,
  /// Parse and validate the config, then print the mapping
  Check,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let _guard = match &cli.log_dir {
    Some(dir) => logging::init_with_file(dir),
    None => {
      logging::init();
      None
    }
  };

  let config =
    Config::load(&cli.config).with_context(|| format!("loading config from {}", cli.config.display()))?;

  match cli.command.unwrap_or(Commands::Run) {
    Commands::Check => check(&config),
    Commands::Run => run(&config).await,
  }
}

fn check(config: &Config) -> Result<()> {
  let mapping = config.mapping().context("invalid mapping")?;
  println!("agent: {} {}", config.agent.command, config.agent.args.join(" "));
  for entry in mapping.entries() {
    println!("{} -> {}", entry.local_root.display(), entry.remote_root);
  }
  Ok(())
}

async fn run(config: &Config) -> Result<()> {
  let launcher = Arc::new(CommandLauncher::new(
    config.agent.command.clone(),
    config.agent.args.clone(),
  ));
  let sink = Arc::new(TracingStatusSink);

  let engine = Engine::start(config, launcher, sink).context("starting sync engine")?;

  tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
  info!("Interrupt received");
  engine.shutdown().await;
  Ok(())
}
