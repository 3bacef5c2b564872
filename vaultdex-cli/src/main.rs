//! # vaultdex CLI
//!
//! Command-line interface for the vaultdex task and record index.

mod commands;
mod context;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaultdex_core::{FilterRule, SortRule};

#[derive(Parser)]
#[command(name = "vaultdex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, env = "VAULTDEX_CONFIG", default_value = "vaultdex.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new vaultdex project
    Init {
        /// Target directory (defaults to current directory)
        path: Option<PathBuf>,
    },

    /// Index the vault, reusing the cache for unchanged documents
    Scan {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Filter and sort indexed records
    Query {
        /// Filter rule: field=value, field!=value, field>value, field<value,
        /// "field includes value" or "field regex pattern"
        #[arg(short, long = "filter")]
        filters: Vec<FilterRule>,

        /// Sort key: field, field:asc or field:desc (repeatable)
        #[arg(short, long = "sort")]
        sort: Vec<SortRule>,

        /// Maximum results to return
        #[arg(long)]
        limit: Option<usize>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Mark an open task done, writing its next occurrence if it repeats
    Complete {
        /// Record id (path:line)
        id: String,
    },

    /// Set the time, end time or duration of a task
    SetTime {
        /// Record id (path:line)
        id: String,

        /// Time of day (HH:MM)
        #[arg(long)]
        time: Option<String>,

        /// End time (HH:MM)
        #[arg(long)]
        end_time: Option<String>,

        /// Free-form duration, e.g. 45m
        #[arg(long)]
        duration: Option<String>,
    },

    /// Keep the index live and stream change notifications as JSON lines
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for command output
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => commands::init_project(path.as_deref()),
        Commands::Scan { json } => commands::scan_vault(&cli.config, json),
        Commands::Query {
            filters,
            sort,
            limit,
            json,
        } => {
            let opts = commands::QueryOptions {
                filters,
                sort,
                limit,
                json,
            };
            commands::query_records(&cli.config, opts)
        }
        Commands::Complete { id } => commands::complete_task(&cli.config, &id),
        Commands::SetTime {
            id,
            time,
            end_time,
            duration,
        } => commands::set_task_time(&cli.config, &id, time, end_time, duration),
        Commands::Watch => commands::watch_vault(&cli.config).await,
    }
}
