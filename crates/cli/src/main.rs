//! NutriTracker CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! nt-cli migrate
//!
//! # Create the admin account from ADMIN_USERNAME / ADMIN_EMAIL / ADMIN_PASSWORD
//! nt-cli admin create
//!
//! # Import products from an Open Food Facts style CSV export
//! nt-cli import data/food_data.csv
//!
//! # Count importable rows without touching the database
//! nt-cli import data/food_data.csv --dry-run
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `admin create` - Create the admin account
//! - `import` - Bulk-load products from CSV

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "nt-cli")]
#[command(author, version, about = "NutriTracker CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Import products from a CSV file
    Import {
        /// Path to the CSV file (headers required)
        path: PathBuf,

        /// Parse and count rows without inserting
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create the admin account from environment variables
    Create,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create => {
                commands::admin::create_from_env().await?;
            }
        },
        Commands::Import { path, dry_run } => {
            let summary = if dry_run {
                commands::import::dry_run(&path)?
            } else {
                commands::import::run(&path).await?
            };
            tracing::info!(
                inserted = summary.inserted,
                rejected = summary.rejected,
                dry_run,
                "Import finished: {} inserted, {} rejected",
                summary.inserted,
                summary.rejected
            );
        }
    }
    Ok(())
}
