use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "lap")]
#[command(about = "Layout-apply orchestrator CLI", long_about = None)]
struct Cli {
    /// Layered YAML config paths in merge order.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a migration plan to completion and print the final record.
    Start {
        /// Path to the plan JSON file ({"procedures": [...]}).
        #[arg(long)]
        plan: String,
    },

    /// Print one apply record.
    Get {
        apply_id: String,
    },

    /// List apply records.
    List {
        /// Filter by status (e.g. COMPLETED, SUSPENDED).
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Comma-separated heavy fields to include (e.g. applyResult).
        #[arg(long)]
        fields: Option<String>,
    },

    /// Request cancellation of a running apply.
    Cancel {
        apply_id: String,
        /// Roll back the completed operations after the cancel drains.
        #[arg(long)]
        rollback: bool,
    },

    /// Resume a suspended apply (or its suspended rollback) to completion.
    Resume {
        apply_id: String,
    },

    /// Delete a terminal apply record.
    Delete {
        apply_id: String,
    },

    /// Apply store migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(&cli.config_paths)?;

    match cli.cmd {
        Commands::Start { plan } => commands::start(&config, &plan).await,
        Commands::Get { apply_id } => commands::get(&config, &apply_id).await,
        Commands::List {
            status,
            limit,
            offset,
            fields,
        } => commands::list(&config, status, limit, offset, fields).await,
        Commands::Cancel { apply_id, rollback } => {
            commands::cancel(&config, &apply_id, rollback).await
        }
        Commands::Resume { apply_id } => commands::resume(&config, &apply_id).await,
        Commands::Delete { apply_id } => commands::delete(&config, &apply_id).await,
        Commands::Migrate => commands::migrate(&config).await,
    }
}
