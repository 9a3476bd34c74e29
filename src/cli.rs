use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(author, version, about = "Media merging and trimming service backed by ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a media file and print its duration
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
