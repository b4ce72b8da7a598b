//! hotarchive: list and archive partitions of a live MySQL table.
//!
//! `archive` swaps one partition's rows into a standalone archive table,
//! records its id and time bounds, and drops the emptied partition.

mod logging;
mod output;
mod settings;

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, Subcommand};
use tracing::info;

use hotarchive_db::{Database, PartitionCatalog, PartitionDescriptor};

use crate::settings::{ConnectionArgs, Settings};

#[derive(Parser)]
#[command(name = "hotarchive")]
#[command(author, version, about = "Hot archival of MySQL table partitions")]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archivable partitions of the source table
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Archive one partition
    #[command(group(ArgGroup::new("target").required(true).args(["partition", "index"])))]
    Archive {
        /// Partition name, e.g. p2024_q1
        partition: Option<String>,

        /// Position in the `list` output instead of a name
        #[arg(short, long)]
        index: Option<usize>,

        /// Run the read-only checks and report what would happen
        #[arg(long)]
        dry_run: bool,
    },

    /// Show partitions archived so far, newest first
    History {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env(&cli.connection)?;
    let config = settings
        .archiver_config()
        .context("invalid archiver configuration")?;

    info!(
        subsystem = "cli",
        op = "connect",
        schema = settings.schema.as_deref().unwrap_or("DATABASE()"),
        source_table = %settings.source_table,
        metadata_table = %settings.metadata_table,
        "Connecting to database"
    );
    let db = Database::connect_with_config(&settings.database_url, settings.pool_config())
        .await
        .context("failed to connect to database")?;
    let db = match settings.schema.as_deref() {
        Some(schema) => db.with_schema(schema),
        None => db,
    };

    match cli.command {
        Commands::List { json } => {
            let partitions = db.catalog.list_partitions(&settings.source_table).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&partitions)?);
            } else {
                print!("{}", output::render_partitions(&settings.source_table, &partitions));
            }
        }
        Commands::Archive {
            partition,
            index,
            dry_run,
        } => {
            let partition = match (partition, index) {
                (Some(name), _) => name,
                (None, Some(index)) => {
                    let partitions = db.catalog.list_partitions(&settings.source_table).await?;
                    partition_at(&partitions, index)?
                }
                (None, None) => bail!("a partition name or --index is required"),
            };

            let archiver = db.archiver(config);
            if dry_run {
                let plan = archiver.plan(&partition).await?;
                print!("{}", output::render_plan(&plan));
            } else {
                let metadata = archiver.archive(&partition).await?;
                print!("{}", output::render_archived(&partition, &metadata));
            }
            db.log_pool_metrics();
        }
        Commands::History { json } => {
            let rows = db.metadata.list_archived(&settings.metadata_table).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", output::render_history(&settings.metadata_table, &rows));
            }
        }
    }

    Ok(())
}

/// Resolve a `list` position to a partition name.
fn partition_at(partitions: &[PartitionDescriptor], index: usize) -> anyhow::Result<String> {
    match partitions.get(index) {
        Some(partition) => Ok(partition.name.clone()),
        None => bail!(
            "invalid partition index {}: {} archivable partition(s) listed",
            index,
            partitions.len()
        ),
    }
}
