//! Command-line driver for the link-matrix core.
//!
//! # Responsibility
//! - Seed a SQLite link store from JSON payloads.
//! - Print a scope as a grid and apply toggles through a matrix session.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linkgrid")]
#[command(about = "Inspect and edit association matrices stored in SQLite")]
struct Cli {
    /// JSON config with logging and commit policy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core linkage and version.
    Ping,
    /// Import rows, columns and embedded links for one scope.
    Seed(commands::SeedArgs),
    /// Print the stored matrix of one scope.
    Show(commands::ShowArgs),
    /// Toggle cells and commit the resulting delta.
    Apply(commands::ApplyArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ping => {
            println!("linkgrid_core ping={}", linkgrid_core::ping());
            println!("linkgrid_core version={}", linkgrid_core::core_version());
            Ok(())
        }
        Commands::Seed(args) => commands::seed(args),
        Commands::Show(args) => commands::show(args, &config).await,
        Commands::Apply(args) => commands::apply(args, &config).await,
    }
}
