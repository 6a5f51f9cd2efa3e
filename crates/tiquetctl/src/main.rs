//! Tiquet Control - administrative CLI for the tiquet ticket tracker.
//!
//! Storage setup, catalog seeding, attachment integrity checks and
//! statistics. Everything goes through the same engine the request
//! layer uses.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use tiquet_core::catalog::CatalogKind;
use tiquet_core::{config, TiquetConfig};

#[derive(Parser)]
#[command(name = "tiquetctl")]
#[command(about = "Tiquet - incidence and suggestion tracker administration", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./tiquet.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database, seed the catalog and create the upload root
    Init,

    /// Inspect and extend the reference catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Check attachment metadata against the files on disk
    CheckAttachments,

    /// Move legacy flat-layout attachment files into the per-ticket tree
    MigrateFiles,

    /// Show dashboard statistics
    Stats {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List the entries of one kind
    List {
        /// statuses, crits, centers or tools
        kind: CatalogKind,
    },

    /// Append an entry to the seed files and re-seed the database
    Add {
        /// statuses, crits, centers or tools
        kind: CatalogKind,

        /// Stable machine code, unique within the kind
        #[arg(long)]
        value: String,

        /// Human-readable label
        #[arg(long)]
        desc: String,
    },

    /// Validate the seed directory files
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::config_path);
    let config = TiquetConfig::load_from(&config_path);

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", &config.log.level);
    }
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .without_time()
        .init();
    debug!("Using config {:?}", config_path);

    match cli.command {
        Commands::Init => commands::init(&config, &config_path),
        Commands::Catalog { action } => match action {
            CatalogAction::List { kind } => commands::catalog_list(&config, kind),
            CatalogAction::Add { kind, value, desc } => {
                commands::catalog_add(&config, kind, &value, &desc)
            }
            CatalogAction::Validate => commands::catalog_validate(&config),
        },
        Commands::CheckAttachments => commands::check_attachments(&config),
        Commands::MigrateFiles => commands::migrate_files(&config),
        Commands::Stats { json } => commands::stats(&config, json),
    }
}
