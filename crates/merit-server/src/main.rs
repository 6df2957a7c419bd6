//! merit-server binary.
//!
//! Reads `merit.toml` (or the path given with `--config`) layered with
//! `MERIT_*` environment variables, then either serves the HTTP API or runs
//! a one-off integrity scan across the two stores.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use merit_server::{ServerConfig, open_service};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Merit achievement tracking server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "merit.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,
  /// Report orphaned content and dangling references.
  Scan {
    /// Delete orphaned content after reporting it.
    #[arg(long)]
    repair: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("MERIT"))
    .build()
    .context("failed to read config file")?;

  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  match cli.command {
    Command::Serve => serve(&cfg).await,
    Command::Scan { repair } => scan(&cfg, repair).await,
  }
}

async fn serve(cfg: &ServerConfig) -> anyhow::Result<()> {
  let app = merit_server::app(cfg).await?;
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

async fn scan(cfg: &ServerConfig, repair: bool) -> anyhow::Result<()> {
  let service = open_service(cfg).await?;
  let report = service
    .scan_integrity(cfg.orphan_grace())
    .await
    .context("integrity scan failed")?;

  println!("{}", serde_json::to_string_pretty(&report)?);

  if repair && !report.orphaned_content.is_empty() {
    let removed = service
      .repair_orphans(&report)
      .await
      .context("orphan repair failed")?;
    tracing::info!(removed, "repair finished");
  }
  if !report.dangling_references.is_empty() {
    tracing::warn!(
      count = report.dangling_references.len(),
      "dangling references need manual attention"
    );
  }
  Ok(())
}
