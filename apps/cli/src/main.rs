//! resup command-line entry point.

mod app;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Resumable chunked uploads.
#[derive(Debug, Parser)]
#[command(name = "resup", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config location).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a file, resuming from its checkpoint if one exists.
    Upload {
        /// File to upload.
        path: PathBuf,

        /// Upload id. Defaults to the file's locator.
        #[arg(long)]
        id: Option<String>,
    },

    /// List persisted checkpoints.
    Checkpoints,

    /// Discard the checkpoint of an upload.
    Abandon {
        /// Upload id.
        id: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,resup=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let config = config::Config::load(&config_path)?;
    tracing::debug!(
        config = %config_path.display(),
        checkpoints = %config.checkpoint_path.display(),
        "configuration ready"
    );

    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(app::run(cli.command, config))? {
        app::Finish::Done => Ok(ExitCode::SUCCESS),
        // Conventional status for termination by SIGINT.
        app::Finish::Cancelled => Ok(ExitCode::from(130)),
    }
}
