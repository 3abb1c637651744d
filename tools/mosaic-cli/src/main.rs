//! Mosaic CLI: record a four-section composite and look at the result.
//!
//! Usage:
//!   mosaic record [OPTIONS]    Record test-pattern sections until Ctrl+C
//!   mosaic check               Show which encoders and capture devices exist
//!   mosaic inspect <FILE>      Summarize a Matroska/WebM recording
//!   mosaic config [--init]     Print or write the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod patterns;

#[derive(Parser)]
#[command(
    name = "mosaic",
    about = "Real-time 2x2 composite recorder",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the composite of four test-pattern sections
    Record {
        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(short, long)]
        duration: Option<f64>,

        /// Composite width (defaults to the configured width)
        #[arg(long)]
        width: Option<u32>,

        /// Composite height (defaults to the configured height)
        #[arg(long)]
        height: Option<u32>,

        /// Target FPS (defaults to the configured rate)
        #[arg(long)]
        fps: Option<u32>,

        /// Capture the default microphone
        #[arg(long)]
        mic: bool,

        /// Capture system audio
        #[arg(long)]
        system_audio: bool,

        /// Output directory (defaults to the configured directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Four comma-separated section feeds: bars, grid, gradient, empty, crop:<pattern>
        #[arg(long, default_value = "bars,grid,gradient,empty")]
        sections: String,
    },

    /// Check encoders and capture devices
    Check,

    /// Summarize a recording
    Inspect {
        /// Path to a .mkv or .webm file
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mosaic_common::config::AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    mosaic_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            duration,
            width,
            height,
            fps,
            mic,
            system_audio,
            output,
            sections,
        } => {
            commands::record::run(
                config,
                commands::record::RecordArgs {
                    duration,
                    width,
                    height,
                    fps,
                    mic,
                    system_audio,
                    output,
                    sections,
                },
            )
            .await
        }
        Commands::Check => commands::check::run(),
        Commands::Inspect { file, json } => commands::inspect::run(file, json),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
