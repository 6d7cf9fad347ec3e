use clap::{Parser, Subcommand};
use mf_core::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(author, version, about = "Convert video, audio and images locally")]
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
    /// Convert files one after another and write the results
    Convert {
        /// Files to convert
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format (defaults to each file's first allowed format)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Target width in pixels (video and images)
        #[arg(long)]
        width: Option<u32>,

        /// Target height in pixels (video and images)
        #[arg(long)]
        height: Option<u32>,

        /// Do not derive the other side from the original aspect ratio.
        /// Implied when both --width and --height are given.
        #[arg(long)]
        no_aspect_lock: bool,

        /// Directory to write converted files into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// List the output formats available for a file or MIME type
    Formats {
        /// File name or MIME type (e.g. "clip.mov" or "video/quicktime")
        target: String,
    },

    /// Show how a file would be classified and its dimensions
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (falls back to --config, then defaults)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
