//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod engines;
mod extract;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use scanscribe::Settings;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Extract text from photographed and scanned documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "SCANSCRIBE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from an image using every available engine
    Extract {
        /// Image file (PNG, JPEG, TIFF, ...)
        image: PathBuf,
        /// Only run this engine (name or role: handwriting, general, layout, fallback)
        #[arg(short, long)]
        engine: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-run extraction on an image with one specific engine
    Reprocess {
        /// Image file
        image: PathBuf,
        /// Engine name or role
        #[arg(short, long)]
        engine: String,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recognition engines and whether they can run
    Engines {
        /// Initialize every engine first so the report shows real readiness
        #[arg(long)]
        probe: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Dot-separated setting to show (e.g., ocr.engines.tesseract)
        setting: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

async fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Settings::load_from_path(&path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Settings::load().await),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config).await?;

    match cli.command {
        Commands::Extract {
            image,
            engine,
            json,
        } => extract::cmd_extract(&settings, &image, engine.as_deref(), json).await,
        Commands::Reprocess {
            image,
            engine,
            json,
        } => extract::cmd_reprocess(&settings, &image, &engine, json).await,
        Commands::Engines { probe, json } => engines::cmd_engines(&settings, probe, json).await,
        Commands::Config { setting, json } => {
            config_cmd::cmd_config_show(&settings, setting.as_deref(), json)
        }
    }
}
