// Input probing using ffprobe

use crate::engine::core::{DEFAULT_MAX_FALL, SubtitleStream, VideoProperties};
use crate::engine::error::ProbeError;
use crate::engine::process::run_to_completion;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source of media metadata
pub trait MediaProbe: Send + Sync {
    /// Stream/container properties of `path`
    fn probe(&self, path: &Path) -> Result<VideoProperties, ProbeError>;

    /// MaxFALL from the first frames' mastering-display side data
    fn max_frame_average_light(&self, path: &Path) -> Option<f64>;

    /// Like [`MediaProbe::max_frame_average_light`], falling back to
    /// [`DEFAULT_MAX_FALL`]
    fn probe_max_frame_average_light(&self, path: &Path) -> f64 {
        self.max_frame_average_light(path)
            .unwrap_or(DEFAULT_MAX_FALL)
    }
}

/// [`MediaProbe`] backed by the ffprobe executable
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    fn run_json(&self, args: &[&str], path: &Path) -> Result<String, ProbeError> {
        let mut full_args: Vec<&std::ffi::OsStr> = args.iter().map(std::ffi::OsStr::new).collect();
        full_args.push(path.as_os_str());

        let output =
            run_to_completion(self.ffprobe.as_os_str(), full_args).map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoProperties, ProbeError> {
        let json = self.run_json(
            &[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ],
            path,
        )?;
        let props = parse_probe_output(&json, path)?;
        debug!(
            "Probed {}: {}x{} {} @ {:.3} fps, {:.2}s",
            path.display(),
            props.width,
            props.height,
            props.codec_name,
            props.frame_rate,
            props.duration
        );
        Ok(props)
    }

    fn max_frame_average_light(&self, path: &Path) -> Option<f64> {
        let json = self.run_json(
            &[
                "-v",
                "quiet",
                "-select_streams",
                "v:0",
                "-show_frames",
                "-read_intervals",
                "%+1",
                "-print_format",
                "json",
            ],
            path,
        );

        match json.map(|j| parse_max_fall(&j)) {
            Ok(Ok(max_fall)) => max_fall,
            Ok(Err(e)) => {
                warn!("Frame side-data probe returned invalid JSON: {}", e);
                None
            }
            Err(e) => {
                warn!("Frame side-data probe failed: {}", e);
                None
            }
        }
    }
}

/// Parse `ffprobe -show_streams -show_format` JSON into [`VideoProperties`]
pub fn parse_probe_output(json: &str, path: &Path) -> Result<VideoProperties, ProbeError> {
    let root: Value = serde_json::from_str(json)?;
    let streams = root["streams"].as_array().map(Vec::as_slice).unwrap_or(&[]);

    let mut video = None;
    let mut audio = None;
    let mut subtitle_streams = Vec::new();

    for stream in streams {
        match stream["codec_type"].as_str() {
            Some("video") if video.is_none() => video = Some(stream),
            Some("audio") if audio.is_none() => audio = Some(stream),
            Some("subtitle") => subtitle_streams.push(SubtitleStream {
                index: lenient_u64(&stream["index"]) as u32,
                codec_name: stream["codec_name"].as_str().unwrap_or_default().to_string(),
                language: stream["tags"]["language"].as_str().map(str::to_string),
            }),
            _ => {}
        }
    }

    let video = video.ok_or_else(|| ProbeError::NoVideoStream(path.to_path_buf()))?;

    let frame_rate = parse_frame_rate(video["avg_frame_rate"].as_str().unwrap_or("0/1"));

    Ok(VideoProperties {
        width: lenient_u64(&video["width"]) as u32,
        height: lenient_u64(&video["height"]) as u32,
        bit_rate: lenient_u64(&video["bit_rate"]),
        codec_name: video["codec_name"].as_str().unwrap_or_default().to_string(),
        frame_rate,
        duration: lenient_f64(&root["format"]["duration"]),
        audio_codec: audio
            .and_then(|a| a["codec_name"].as_str())
            .unwrap_or_default()
            .to_string(),
        audio_bit_rate: audio.map(|a| lenient_u64(&a["bit_rate"])).unwrap_or(0),
        subtitle_streams,
        max_frame_average_light: None,
    })
}

/// First non-zero `max_fall` in a "Mastering display metadata" side-data record
pub fn parse_max_fall(json: &str) -> Result<Option<f64>, serde_json::Error> {
    let root: Value = serde_json::from_str(json)?;
    let frames = root["frames"].as_array().map(Vec::as_slice).unwrap_or(&[]);

    let found = frames
        .iter()
        .filter_map(|frame| frame["side_data_list"].as_array())
        .flatten()
        .filter(|sd| sd["side_data_type"].as_str() == Some("Mastering display metadata"))
        .map(|sd| lenient_f64(&sd["max_fall"]))
        .find(|v| *v > 0.0);

    Ok(found)
}

/// Parse a rational like "24000/1001"; a zero denominator yields 0.0
pub fn parse_frame_rate(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let numerator: f64 = num.trim().parse().unwrap_or(0.0);
            let denominator: f64 = den.trim().parse().unwrap_or(0.0);
            if denominator == 0.0 {
                0.0
            } else {
                numerator / denominator
            }
        }
        None => s.trim().parse().unwrap_or(0.0),
    }
}

/// ffprobe emits most numbers as strings ("bit_rate": "2000000")
fn lenient_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)).unwrap_or(0),
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
