//! `ward`: offline clinical records client.
//!
//! # Usage
//!
//! ```
//! ward --url https://emr.example.org --user nurse --password secret sync full
//! ward sync obs
//! ward chart 6d2ad2a4-0a0c-4c5e-9a77-3a2b7c2f1e01 --locale fr
//! ward --config ~/.config/ward/ward.toml status
//! ```

mod app;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use app::App;
use clap::{Parser, Subcommand};
use settings::{Overrides, WardConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ward", version, about = "Offline clinical records client")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", default_value = "ward.toml")]
  config: PathBuf,

  /// Base URL of the clinical server.
  #[arg(long)]
  url: Option<String>,

  /// Server username.
  #[arg(long)]
  user: Option<String>,

  /// Server password.
  #[arg(long)]
  password: Option<String>,

  /// Locale used for names in chart and location output.
  #[arg(long)]
  locale: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pull data from the server.
  Sync {
    #[command(subcommand)]
    kind: SyncCommand,
  },
  /// Show the sync state.
  Status,
  /// List cached patients.
  Patients {
    /// Only patients assigned directly to this location.
    #[arg(long)]
    location: Option<Uuid>,
  },
  /// Show the location tree with patient counts.
  Locations,
  /// Assemble a patient's chart.
  Chart { patient: Uuid },
  /// Suggested values for a new encounter.
  Prepopulate { patient: Uuid },
  /// Record an encounter: `ward submit <patient> CONCEPT=VALUE...`
  Submit {
    patient: Uuid,
    #[arg(required = true, value_name = "CONCEPT=VALUE")]
    values:  Vec<String>,
  },
  /// Void an observation on the server and locally.
  Void { observation: Uuid },
}

#[derive(Subcommand, Debug)]
enum SyncCommand {
  /// Replace all reference data.
  Full,
  /// Fetch observations newer than the watermark.
  Obs,
  /// Re-fetch one patient's observations.
  Patient { patient: Uuid },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let cfg = WardConfig::load(&args.config, Overrides {
    url:      args.url,
    user:     args.user,
    password: args.password,
    locale:   args.locale,
  })?;

  // The worker pool runs every network and store call off the main thread.
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(cfg.workers)
    .enable_all()
    .build()
    .context("failed to build runtime")?;

  runtime.block_on(run(cfg, args.command))
}

async fn run(cfg: WardConfig, command: Command) -> anyhow::Result<()> {
  let app = App::open(cfg).await?;
  let _events = app.log_events();

  match command {
    Command::Sync { kind: SyncCommand::Full } => app.full_sync().await,
    Command::Sync { kind: SyncCommand::Obs } => app.observation_sync().await,
    Command::Sync { kind: SyncCommand::Patient { patient } } => {
      app.refresh_patient(patient).await
    }
    Command::Status => app.status().await,
    Command::Patients { location } => app.patients(location).await,
    Command::Locations => app.locations().await,
    Command::Chart { patient } => app.chart(patient).await,
    Command::Prepopulate { patient } => app.prepopulate(patient).await,
    Command::Submit { patient, values } => app.submit(patient, &values).await,
    Command::Void { observation } => app.void(observation).await,
  }
}
