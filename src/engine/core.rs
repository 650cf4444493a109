mod ffmpeg_cmd;
mod ffmpeg_info;
mod filter;
mod log;
mod progress;
mod types;

pub use ffmpeg_cmd::{BuiltCommand, CapabilityWarning, CommandBuilder, Platform};
pub use ffmpeg_info::{ffmpeg_version, ffprobe_version, parse_version_line};
pub use filter::{DEFAULT_MAX_FALL, FilterChain, Scale, format_number};
pub use log::{debug_log_path, write_debug_log};
pub use progress::{
    HARDWARE_FAILURE_SIGNATURES, ProgressParser, is_hardware_failure_line, parse_time,
};
pub use types::{
    Codec, ConversionRequest, FilterKind, JobId, MAX_GAMMA, MIN_GAMMA, SubtitleStream,
    TonemapOperator, VideoProperties,
};
