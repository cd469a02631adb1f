//! s32s3 command line
//!
//! ```bash
//! # Back up every source bucket and the instance metadata
//! s32s3 backup
//!
//! # Restore, optionally as of a point in time
//! s32s3 restore --at 2024-05-01T12:00:00
//!
//! # Show the generated relay configuration
//! s32s3 relay-config
//! ```
//!
//! Settings come from the environment (and `.env` if present); see
//! `BackupConfig` for the keys.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use s32s3::archive::ARCHIVE_FILE_NAME;
use s32s3::config::BackupConfig;
use s32s3::orchestrator::{BackupOrchestrator, RestoreOrchestrator, RunReport, RunSettings};
use s32s3::relay::{parse_point_in_time, RcloneRunner, RelayConfig};
use s32s3::shutdown::{shutdown_signal, until_shutdown};
use s32s3::target::{resolve_target, TargetRole};

#[derive(Parser)]
#[command(name = "s32s3", version, about = "Backup and restore S3 buckets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up all buckets and instance metadata
    Backup,
    /// Restore all buckets and instance metadata
    Restore {
        /// Restore the state at a local time, formatted YYYY-MM-DDTHH:MM:SS
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the generated relay configuration
    RelayConfig,
    /// Export the source instance metadata archive
    ExportMetadata {
        /// Where to write the archive
        #[arg(long, default_value = ARCHIVE_FILE_NAME)]
        out: PathBuf,
    },
    /// List buckets of a target
    ListBuckets {
        #[arg(long, value_enum, default_value_t = Role::Source)]
        role: Role,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Source,
    Dest,
}

impl From<Role> for TargetRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Source => TargetRole::Source,
            Role::Dest => TargetRole::Dest,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match until_shutdown(run(cli.command), shutdown_signal()).await {
        Some(Ok(true)) => ExitCode::SUCCESS,
        Some(Ok(false)) => ExitCode::FAILURE,
        Some(Err(e)) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
        None => {
            warn!("Interrupted, cancelling run");
            ExitCode::from(130)
        }
    }
}

/// Returns whether the command fully succeeded
async fn run(command: Commands) -> Result<bool> {
    let config = BackupConfig::from_env().context("loading configuration")?;

    match command {
        Commands::Backup => {
            let source = resolve_target(&config.source, TargetRole::Source).await?;
            let dest = resolve_target(&config.dest, TargetRole::Dest).await?;
            let relay = relay(&config)?;

            let report = BackupOrchestrator::new(source, dest, relay, RunSettings::from_config(&config))
                .run()
                .await
                .context("backup failed")?;
            Ok(summarize(&report))
        }
        Commands::Restore { at } => {
            let at = at
                .as_deref()
                .map(parse_point_in_time)
                .transpose()
                .context("invalid --at")?;
            let source = resolve_target(&config.source, TargetRole::Source).await?;
            let relay = relay(&config)?;

            let report = RestoreOrchestrator::new(source, relay, RunSettings::from_config(&config))
                .at(at)
                .run()
                .await
                .context("restore failed")?;
            Ok(summarize(&report))
        }
        Commands::RelayConfig => {
            RelayConfig::new(&config)?.render(&mut io::stdout().lock(), None)?;
            Ok(true)
        }
        Commands::ExportMetadata { out } => {
            let source = resolve_target(&config.source, TargetRole::Source).await?;
            let archive = source.export_metadata().await?;
            if archive.is_empty() {
                warn!("Source exported no metadata");
            }
            let path = archive.write_to_file(&out)?;
            println!("{}", path.display());
            Ok(true)
        }
        Commands::ListBuckets { role } => {
            let role = TargetRole::from(role);
            let remote = match role {
                TargetRole::Source => &config.source,
                TargetRole::Dest => &config.dest,
            };
            for bucket in resolve_target(remote, role).await?.list_buckets().await? {
                println!("{}", bucket);
            }
            Ok(true)
        }
    }
}

fn relay(config: &BackupConfig) -> Result<Arc<RcloneRunner>> {
    let relay_config = RelayConfig::new(config).context("rendering relay configuration")?;
    let runner = RcloneRunner::new(&config.rclone_binary, relay_config)
        .context("creating relay config directory")?;
    Ok(Arc::new(runner))
}

fn summarize(report: &RunReport) -> bool {
    let failed = report.failed_buckets();
    if report.is_success() {
        info!(run_id = %report.run_id, buckets = report.buckets.len(), "Run completed");
    } else {
        error!(
            run_id = %report.run_id,
            failed_buckets = ?failed,
            metadata = ?report.metadata,
            "Run completed with failures"
        );
    }
    report.is_success()
}
