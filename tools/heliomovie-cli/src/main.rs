//! Heliomovie CLI: validate movie jobs and build them into encoded movies.
//!
//! Usage:
//!   heliomovie build <JOB>       Render frames and encode every requested profile
//!   heliomovie validate <JOB>    Check a job descriptor without rendering
//!   heliomovie profiles          List the encoder profiles
//!   heliomovie check             Check the encoder and configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use heliomovie_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "heliomovie",
    about = "Assemble solar image sequences into distributable movies",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a movie from a job descriptor
    Build {
        /// Path to the job JSON file
        job: PathBuf,

        /// Directory that receives finished movies
        #[arg(long)]
        movies_dir: Option<PathBuf>,

        /// Root for per-job working directories
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Per-profile encoder timeout (seconds)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Write the build report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate a job descriptor
    Validate {
        /// Path to the job JSON file
        job: PathBuf,
    },

    /// List encoder profiles
    Profiles {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the encoder binary and configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    heliomovie_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Build {
            job,
            movies_dir,
            work_dir,
            timeout_secs,
            report,
        } => {
            if let Some(dir) = movies_dir {
                config.movies_dir = dir;
            }
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            commands::build::run(job, config, timeout_secs, report).await
        }
        Commands::Validate { job } => commands::validate::run(job),
        Commands::Profiles { json } => commands::profiles::run(json),
        Commands::Check => commands::check::run(&config),
    }
}
