use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one ConversionJob (a retry gets a fresh id)
pub type JobId = Uuid;

/// Which filter chain variant to build
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Static,
    Dynamic, // Linearises with the probed MaxFALL before tonemapping
}

/// Tonemap operator passed to ffmpeg's `tonemap` filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TonemapOperator {
    #[default]
    Reinhard,
    Mobius,
    Hable,
}

/// Output video codec
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    H265,
}

impl FilterKind {
    pub const ALL: [FilterKind; 2] = [FilterKind::Static, FilterKind::Dynamic];

    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::Static => "static",
            FilterKind::Dynamic => "dynamic",
        }
    }
}

impl TonemapOperator {
    pub const ALL: [TonemapOperator; 3] = [
        TonemapOperator::Reinhard,
        TonemapOperator::Mobius,
        TonemapOperator::Hable,
    ];

    /// Name as understood by the ffmpeg `tonemap` filter
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            TonemapOperator::Reinhard => "reinhard",
            TonemapOperator::Mobius => "mobius",
            TonemapOperator::Hable => "hable",
        }
    }
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Codec::H264 => "H.264",
            Codec::H265 => "H.265 (HEVC)",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for TonemapOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(FilterKind::Static),
            "dynamic" => Ok(FilterKind::Dynamic),
            other => Err(format!(
                "Invalid filter '{}'. Valid filters: static, dynamic",
                other
            )),
        }
    }
}

impl FromStr for TonemapOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reinhard" => Ok(TonemapOperator::Reinhard),
            "mobius" => Ok(TonemapOperator::Mobius),
            "hable" => Ok(TonemapOperator::Hable),
            other => Err(format!(
                "Invalid tonemap operator '{}'. Valid operators: reinhard, mobius, hable",
                other
            )),
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(Codec::H264),
            "h265" | "h.265" | "hevc" => Ok(Codec::H265),
            other => Err(format!("Invalid codec '{}'. Valid codecs: h264, h265", other)),
        }
    }
}

/// A subtitle stream reported by ffprobe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleStream {
    pub index: u32,
    pub codec_name: String,
    pub language: Option<String>,
}

/// Snapshot of the source file's stream/container properties
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub bit_rate: u64,
    pub codec_name: String,
    pub frame_rate: f64,
    pub duration: f64,
    pub audio_codec: String,
    pub audio_bit_rate: u64,
    pub subtitle_streams: Vec<SubtitleStream>,

    /// MaxFALL from mastering-display side data; only probed for Dynamic requests
    #[serde(default)]
    pub max_frame_average_light: Option<f64>,
}

impl VideoProperties {
    /// Copy with the secondary MaxFALL probe result attached
    pub fn with_max_frame_average_light(mut self, max_fall: f64) -> Self {
        self.max_frame_average_light = Some(max_fall);
        self
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_codec.is_empty()
    }

    pub fn has_subtitles(&self) -> bool {
        !self.subtitle_streams.is_empty()
    }
}

/// Lowest gamma the request accepts (matches the preview slider)
pub const MIN_GAMMA: f64 = 0.1;
/// Highest gamma the request accepts
pub const MAX_GAMMA: f64 = 3.0;

/// What the caller wants converted and how
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub gamma: f64,
    pub use_gpu: bool,
    pub filter_kind: FilterKind,
    pub tonemap: TonemapOperator,
    pub codec: Codec,
}

impl ConversionRequest {
    /// Request with default tuning (gamma 1.0, Static, Reinhard, H.264 on CPU)
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            gamma: 1.0,
            use_gpu: false,
            filter_kind: FilterKind::default(),
            tonemap: TonemapOperator::default(),
            codec: Codec::default(),
        }
    }

    /// Same request with hardware acceleration forced off (GPU fallback)
    pub fn cpu_fallback(&self) -> Self {
        Self {
            use_gpu: false,
            ..self.clone()
        }
    }
}
