//! snapvol CLI

use clap::{Parser, Subcommand};
use serde::Serialize;
use snapvol::{Config, InspectReport, VolumeHost};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "snapvol")]
#[command(about = "Volume and snapshot catalog")]
#[command(version)]
struct Cli {
    /// Data directory (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage volumes
    #[command(subcommand)]
    Volume(VolumeCommand),

    /// Manage snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand)]
enum VolumeCommand {
    /// Create a volume
    Create {
        /// Volume name (defaults to the generated id)
        #[arg(long)]
        name: Option<String>,

        /// Clone the volume from this snapshot
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Remove one or more volumes
    #[command(alias = "remove")]
    Rm {
        #[arg(required = true)]
        volumes: Vec<String>,
    },

    /// List volumes
    #[command(alias = "list")]
    Ls,

    /// Display detailed information on one or more volumes
    Inspect {
        #[arg(required = true)]
        volumes: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Snapshot a volume
    Create {
        /// Volume to snapshot
        #[arg(long)]
        volume: String,

        /// Snapshot name (defaults to the generated id)
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove one or more snapshots
    #[command(alias = "remove")]
    Rm {
        #[arg(required = true)]
        snapshots: Vec<String>,
    },

    /// List snapshots
    #[command(alias = "list")]
    Ls,

    /// Display detailed information on one or more snapshots
    Inspect {
        #[arg(required = true)]
        snapshots: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let host = VolumeHost::open(&config)?;
    let ok = match cli.command {
        Commands::Volume(cmd) => run_volume(&host, cmd).await?,
        Commands::Snapshot(cmd) => run_snapshot(&host, cmd).await?,
    };
    host.shutdown()?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_volume(host: &VolumeHost, cmd: VolumeCommand) -> anyhow::Result<bool> {
    match cmd {
        VolumeCommand::Create { name, snapshot } => {
            match host
                .volumes()
                .create(name.as_deref(), snapshot.as_deref())
                .await
            {
                Ok(volume) => {
                    println!("{}", volume.name);
                    Ok(true)
                }
                Err(e) => Ok(report_error(&e)),
            }
        }

        VolumeCommand::Rm { volumes } => {
            let mut ok = true;
            for token in volumes {
                match host.volumes().remove(&token).await {
                    Ok(volume) => println!("{}", volume.name),
                    Err(e) => ok = report_error(&e),
                }
            }
            Ok(ok)
        }

        VolumeCommand::Ls => {
            println!("{:<32}  {:<32}  {:>9}", "NAME", "SOURCE", "SNAPSHOTS");
            for volume in host.volumes().list() {
                let source = volume
                    .source_snapshot
                    .as_ref()
                    .map(|id| {
                        host.snapshots()
                            .inspect(id.as_str())
                            .map(|s| s.name)
                            .unwrap_or_else(|_| id.to_string())
                    })
                    .unwrap_or_default();
                println!(
                    "{:<32}  {:<32}  {:>9}",
                    volume.name, source, volume.dependent_snapshots
                );
            }
            Ok(true)
        }

        VolumeCommand::Inspect { volumes } => print_report(host.volumes().inspect_many(volumes)),
    }
}

async fn run_snapshot(host: &VolumeHost, cmd: SnapshotCommand) -> anyhow::Result<bool> {
    match cmd {
        SnapshotCommand::Create { volume, name } => {
            match host.snapshots().create(&volume, name.as_deref()).await {
                Ok(snapshot) => {
                    println!("{}", snapshot.name);
                    Ok(true)
                }
                Err(e) => Ok(report_error(&e)),
            }
        }

        SnapshotCommand::Rm { snapshots } => {
            let mut ok = true;
            for token in snapshots {
                match host.snapshots().remove(&token).await {
                    Ok(snapshot) => println!("{}", snapshot.name),
                    Err(e) => ok = report_error(&e),
                }
            }
            Ok(ok)
        }

        SnapshotCommand::Ls => {
            println!("{:<32}  {:<32}", "NAME", "VOLUME");
            for snapshot in host.snapshots().list() {
                let volume = host
                    .volumes()
                    .inspect(snapshot.volume.as_str())
                    .map(|v| v.name)
                    .unwrap_or_else(|_| snapshot.volume.to_string());
                println!("{:<32}  {:<32}", snapshot.name, volume);
            }
            Ok(true)
        }

        SnapshotCommand::Inspect { snapshots } => {
            print_report(host.snapshots().inspect_many(snapshots))
        }
    }
}

/// Print resolved records as a JSON array and failures to stderr
fn print_report<T: Serialize>(report: InspectReport<T>) -> anyhow::Result<bool> {
    let (records, errors) = report.into_parts();
    println!("{}", serde_json::to_string_pretty(&records)?);

    for e in &errors {
        eprintln!("Error: {}", e);
    }
    Ok(errors.is_empty())
}

fn report_error(e: &snapvol::Error) -> bool {
    eprintln!("Error: {}", e);
    false
}
