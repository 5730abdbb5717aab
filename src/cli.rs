use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "metatrack")]
#[command(author, version, about = "Record video with a synchronized timed-metadata track")]
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
    /// Record a synthetic capture session and store the result
    Record {
        /// Number of video frames to capture
        #[arg(short, long, default_value = "90")]
        frames: u64,

        /// Emit a metadata event every N frames
        #[arg(long, default_value = "15")]
        metadata_every: u64,

        /// Pace frames in real time instead of as fast as possible
        #[arg(long)]
        realtime: bool,
    },

    /// Show tracks, duration and metadata samples of a recorded file
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a file's metadata track through the synchronizer
    Play {
        /// File to play
        #[arg(required = true)]
        file: PathBuf,

        /// Playback clock step in milliseconds
        #[arg(long, default_value = "100")]
        step_ms: u64,

        /// Seek to this position before playing
        #[arg(long)]
        seek_ms: Option<u64>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
