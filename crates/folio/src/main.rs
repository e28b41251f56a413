//! folio - static blog compiler.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::{ConfigFile, Overrides};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Compiles Markdown articles into a static blog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to blog.toml config file
    #[arg(short, long, global = true, default_value = "blog.toml")]
    config: PathBuf,

    /// Directory holding the article sources
    #[arg(long, global = true)]
    content: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every article, the index page and the RSS feed
    Build,

    /// Build a single article, drafts included
    Article {
        /// Article directory containing index.md
        dir: PathBuf,
    },

    /// Rebuild only the index page and the RSS feed
    Index,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = ConfigFile::load(&cli.config)?.into_build_config(Overrides {
        content: cli.content,
        output: cli.output,
    });

    match cli.command {
        Commands::Build => commands::build::run(config)?,
        Commands::Article { dir } => commands::article::run(config, &dir)?,
        Commands::Index => commands::index::run(config)?,
    }

    Ok(())
}
