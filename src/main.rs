//! tbtquery - Thunderbolt firmware metadata from macOS installers.
//!
//! Every macOS installer ships the Thunderbolt controller firmware for each
//! supported machine board inside `FirmwareUpdate.pkg`. This tool digs the
//! package out of the installer's disk images, reads the per-board updater
//! configs, and maintains a version-keyed database of the records:
//! - `init` creates an empty database file
//! - `query` runs installers through the pipeline, in parallel
//! - `render` turns a database into an indented report

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tbtquery::commands;
use tbtquery::commands::query::QueryArgs;
use tbtquery::config::Config;

#[derive(Parser)]
#[command(name = "tbtquery")]
#[command(about = "Query Thunderbolt firmware metadata from macOS installers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty firmware database
    Init {
        /// Path of the database file to create
        database: PathBuf,
    },

    /// Query installers for Thunderbolt firmware records
    Query {
        /// Installer apps (or disk images with --dmg)
        files: Vec<PathBuf>,

        /// Treat the inputs as disk images containing installer apps
        #[arg(long)]
        dmg: bool,

        /// Merge results into this database instead of printing them
        #[arg(long)]
        database: Option<PathBuf>,

        /// Replace records for versions already in the database
        #[arg(long)]
        overwrite: bool,

        /// Copy firmware payloads under this directory, grouped by version
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Render a database as an indented report
    Render {
        /// Path of the database file
        database: PathBuf,

        /// Write the report to this file instead of stdout
        #[arg(long)]
        markdown: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load();

    match cli.command {
        Commands::Init { database } => commands::cmd_init(&database),
        Commands::Query {
            files,
            dmg,
            database,
            overwrite,
            output,
        } => commands::cmd_query(
            QueryArgs {
                files,
                disk_images: dmg,
                database,
                overwrite,
                output,
            },
            &config,
        ),
        Commands::Render { database, markdown } => {
            commands::cmd_render(&database, markdown.as_deref())
        }
    }
}
