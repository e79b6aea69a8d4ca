use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use awp::config::Config;
use awp::logging::init_logging;
use awp::orchestrator::RunOptions;

mod cmd;

#[derive(Parser)]
#[command(name = "awp")]
#[command(version, about = "Generate a white paper chapter by chapter with operator review")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate chapters through the configured worker
    Generate {
        /// Chapters to generate: "all" or a comma-separated list such as "1,2,3"
        #[arg(short, long, default_value = "all")]
        chapters: String,

        /// Continue from the stored checkpoint
        #[arg(long)]
        resume: bool,

        /// Pause for review after the chapters listed in paper.review_after
        #[arg(long)]
        review: bool,

        /// Print the planned chapter sequence without starting the worker
        #[arg(long)]
        dry_run: bool,
    },
    /// Export the approved chapters to another format
    Export {
        /// Target format: markdown, latex or pdf
        #[arg(short, long, default_value = "pdf")]
        format: String,

        /// Write the target artifact here instead of the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show configuration and chapter progress
    Status,
    /// Discard the checkpoint and chapter drafts
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::new(project_dir, cli.verbose)?;
    // Held until exit so buffered file logs are flushed
    let _log_guard = init_logging(&config.toml.logging, &config.project_dir, cli.verbose)?;

    match cli.command {
        Commands::Generate {
            chapters,
            resume,
            review,
            dry_run,
        } => {
            let options = RunOptions {
                resume,
                review,
                dry_run,
            };
            cmd::cmd_generate(&config, &chapters, options).await?;
        }
        Commands::Export { format, output } => cmd::cmd_export(&config, &format, output)?,
        Commands::Status => cmd::cmd_status(&config)?,
        Commands::Reset { force } => cmd::cmd_reset(&config, force)?,
    }

    Ok(())
}
