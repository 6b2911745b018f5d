//! oxide-lists-migrate CLI
//!
//! Command-line tool for keeping a database in step with declared lists.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_lists::list::ListRegistry;
use oxide_lists_migrate::prelude::*;

/// Snapshot-diffing migrations for declarative lists.
#[derive(Parser)]
#[command(name = "oxide-lists-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// JSON file declaring the lists.
    #[arg(short, long, default_value = "lists.json")]
    lists: PathBuf,

    /// Directory holding computed plan artifacts.
    #[arg(short, long, default_value = "compiled")]
    artifacts_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the declared lists against the latest snapshot and write the plan.
    CreateModifications,

    /// Apply a plan written by `create-modifications`.
    ApplyModifications {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Plan and apply in one step.
    Migrate {
        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show stored schema snapshots.
    ShowSnapshots,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let registry = ListRegistry::from_json_file(&cli.lists)?;
    info!(
        lists = registry.len(),
        path = %cli.lists.display(),
        "Loaded list declarations"
    );

    // Connect to database
    let options = SqliteConnectOptions::from_str(&cli.database)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let executor = Executor::new(pool, SqliteDialect::new(), registry)?;

    match cli.command {
        Commands::CreateModifications => {
            let plan = executor.plan().await?;
            if plan.is_empty() {
                info!("No changes detected.");
            }
            for modification in &plan.modifications {
                info!("  {}", modification);
            }
            plan.write(&cli.artifacts_dir)?;
        }

        Commands::ApplyModifications { dry_run } => {
            let plan = PlanArtifacts::read(&cli.artifacts_dir)?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            report(executor.dry_run(dry_run).apply(&plan).await?);
        }

        Commands::Migrate { dry_run } => {
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }
            report(executor.dry_run(dry_run).migrate().await?);
        }

        Commands::ShowSnapshots => {
            let snapshots = executor.snapshots().await?;

            if snapshots.is_empty() {
                info!("No schema snapshots have been stored yet.");
            } else {
                println!("\nSchema snapshots:");
                println!("{:-<60}", "");

                for snapshot in &snapshots {
                    println!(
                        " [{}] #{} ({}, {} lists)",
                        if snapshot.active { "X" } else { " " },
                        snapshot.id,
                        snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
                        snapshot.content.len()
                    );
                }
                println!();
            }
        }
    }

    Ok(())
}

fn report(stored: Option<SchemaSnapshotRecord>) {
    if let Some(record) = stored {
        info!(id = record.id, "Stored schema snapshot");
    }
}
