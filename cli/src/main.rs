//! `rollcall` command line entry point.
//!
//! Registers students and records attendance from image files, printing
//! each result as JSON on stdout. Logs go to stderr and follow `RUST_LOG`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rollcall_recognition::{AttendanceEngine, Identity, RollcallConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Face recognition attendance")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll a student from an image with exactly one face
    Register {
        #[arg(long)]
        id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Image (or precomputed embedding document) to enroll from
        #[arg(long)]
        image: PathBuf,
    },
    /// Recognize the face in an image and record attendance
    Capture {
        #[arg(long)]
        image: PathBuf,
    },
    /// Print engine statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RollcallConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RollcallConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    debug!("Using data directory {}", config.data_dir.display());

    let engine = AttendanceEngine::builder()
        .with_config(config)
        .build()
        .await
        .context("failed to start attendance engine")?;

    match cli.command {
        Command::Register {
            id,
            first_name,
            last_name,
            image,
        } => {
            let image = read_image(&image).await?;
            let receipt = engine
                .register(Identity::new(id, first_name, last_name), &image)
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Capture { image } => {
            let image = read_image(&image).await?;
            let response = engine.capture(&image).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats())?);
        }
    }

    Ok(())
}

async fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))
}
