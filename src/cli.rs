use clap::{Args, Parser, Subcommand};
use hdr2sdr::engine::{Codec, FilterKind, TonemapOperator};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hdr2sdr")]
#[command(about = "Convert HDR video to SDR with ffmpeg tonemapping", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Tonemapping options shared by `convert` and `preview`.
/// Unset options fall back to the config file defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// Gamma correction (0.1 - 3.0)
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Filter variant: static or dynamic (MaxFALL-driven)
    #[arg(long)]
    pub filter: Option<FilterKind>,

    /// Tonemap operator: reinhard, mobius or hable
    #[arg(long)]
    pub tonemap: Option<TonemapOperator>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert an HDR video to SDR
    Convert {
        input: PathBuf,

        /// Defaults to `<input stem>_sdr<input extension>` beside the input
        output: Option<PathBuf>,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,

        /// Output codec: h264 or h265
        #[arg(long)]
        codec: Option<Codec>,

        /// Use NVENC hardware encoding (falls back to CPU on GPU errors)
        #[arg(long, conflicts_with = "cpu")]
        gpu: bool,

        /// Force CPU encoding (overrides config)
        #[arg(long)]
        cpu: bool,

        /// Print the ffmpeg command without executing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the properties ffprobe reports for a video file
    Probe {
        /// Path to the video file
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract a single preview frame as PNG
    Preview {
        input: PathBuf,

        /// Output PNG path
        output: PathBuf,

        /// Apply the conversion filter chain
        #[arg(long)]
        converted: bool,

        /// Write the original and converted frames side by side
        #[arg(long, conflicts_with = "converted")]
        compare: bool,

        #[command(flatten)]
        tuning: TuningArgs,

        /// Position in seconds (default: a third of the duration)
        #[arg(long, conflicts_with = "frame")]
        timestamp: Option<f64>,

        /// Evenly spaced preview position, 1-based
        #[arg(long)]
        frame: Option<usize>,
    },

    /// Check NVENC hardware encoding availability
    CheckGpu,

    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
