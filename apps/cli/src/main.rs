//! reget CLI - Command-line downloader
//!
//! Downloads a single URL to a file, picking up where a previous run stopped.

mod commands;
mod config;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reget_core::DownloadManager;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// reget - Resumable downloader
#[derive(Parser)]
#[command(name = "reget")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON settings file
    #[arg(long, env = "REGET_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Range and read buffer size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL, resuming a partial file if there is one
    Get {
        /// URL to download
        url: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Probe URLs for size and range support
    Probe {
        /// URLs to probe
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        use clap::CommandFactory;
        clap_complete::generate(*shell, &mut Cli::command(), "reget", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let settings = config::load_settings(cli.config.as_deref(), cli.chunk_size)?;
    let manager = DownloadManager::new(settings)?;

    match cli.command {
        Commands::Get { url, output } => commands::get(&manager, &url, output, cli.output).await,
        Commands::Probe { urls } => commands::probe_urls(&manager, urls, cli.output).await,
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Log to stderr so progress output on the terminal stays readable
fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,reget=info,reget_core=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
