//! Error taxonomy of the conversion core.
//!
//! Runtime failures (non-zero exit), GPU failures and cancellation are not
//! errors here: they reach the observer as [`TerminalState`] values.
//!
//! [`TerminalState`]: crate::engine::supervisor::TerminalState

use std::path::PathBuf;
use thiserror::Error;

/// Request rejected before anything was probed or spawned
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Please select both an input file and an output file")]
    MissingPaths,

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Input and output refer to the same file: {0}")]
    SameInputOutput(PathBuf),

    #[error("Output file already exists: {0} (use --force to overwrite)")]
    OutputExists(PathBuf),

    #[error("Gamma {0} is outside the supported range {min}-{max}", min = crate::engine::core::MIN_GAMMA, max = crate::engine::core::MAX_GAMMA)]
    GammaOutOfRange(f64),
}

/// Metadata could not be obtained for a source file
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to run ffprobe: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffprobe exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Failed to parse ffprobe JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No video stream found in {0}")]
    NoVideoStream(PathBuf),
}

/// The external tool could not be started
#[derive(Error, Debug)]
#[error("Failed to spawn {program}: {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Why `ProcessSupervisor::start` refused a request
#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to retrieve video properties: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("A conversion is already running")]
    Busy,
}

/// Preview extraction failure; reported synchronously and never retried
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid video properties or duration ({0})")]
    InvalidDuration(f64),

    #[error("Failed to probe video: {0}")]
    Probe(#[from] ProbeError),

    #[error("Failed to run ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("There was an error importing this video. Colorspace mismatch.")]
    ColorspaceMismatch,

    #[error("FFmpeg exited with {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    #[error("Failed to decode extracted frame: {0}")]
    Decode(#[from] image::ImageError),
}
