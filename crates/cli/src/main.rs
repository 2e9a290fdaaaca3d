//! trawl CLI - crawler and search indexer for content-addressed filesystems

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use trawl::Daemon;
use trawl_core::Config;

mod logging;

use logging::{init_cli_logging, init_daemon_logging};

#[derive(Parser)]
#[command(name = "trawl")]
#[command(about = "Crawler and search indexer for content-addressed filesystems")]
#[command(after_help = "\
QUICK START:
  trawl config init                      # Write a default config file
  trawl crawl --seed Qm... --foreground  # Crawl from a seed hash

The crawler consumes the hashes, files and directories queues until
interrupted; temporary failures are requeued, invalid resources are
written off permanently.")]
struct Cli {
  /// Path to a config file (default: ~/.config/trawl/config.toml)
  #[arg(short, long, global = true, value_name = "FILE")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the crawler until interrupted
  Crawl {
    /// Content IDs to seed the hashes queue with
    #[arg(short, long = "seed", value_name = "CID")]
    seeds: Vec<String>,
    /// Log to the console instead of the log file
    #[arg(long)]
    foreground: bool,
  },
  /// Manage configuration
  Config {
    #[command(subcommand)]
    command: ConfigCommand,
  },
}

#[derive(Subcommand)]
enum ConfigCommand {
  /// Write a default config file to the user config directory
  Init {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
  },
  /// Print the resolved configuration
  Show,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Config::load(cli.config.as_deref())?;

  match cli.command {
    Commands::Crawl { seeds, foreground } => {
      let _guard = init_daemon_logging(&config.daemon, foreground);
      Daemon::new(config).run(seeds).await?;
    }
    Commands::Config { command } => {
      init_cli_logging();
      match command {
        ConfigCommand::Init { force } => cmd_config_init(force)?,
        ConfigCommand::Show => print!("{}", toml::to_string_pretty(&config)?),
      }
    }
  }

  Ok(())
}

fn cmd_config_init(force: bool) -> Result<()> {
  let Some(path) = Config::user_config_path() else {
    anyhow::bail!("could not determine the user config directory");
  };

  if path.exists() && !force {
    anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
  }

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }

  std::fs::write(&path, Config::generate_template())?;
  println!("wrote {}", path.display());
  Ok(())
}
