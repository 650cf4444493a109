//! Single-frame preview extraction.
//!
//! The preview shares the filter chain of a real conversion but keeps the
//! source's native dimensions and emits exactly one PNG frame on stdout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tracing::{debug, error};

use crate::engine::core::{
    FilterChain, FilterKind, Scale, TonemapOperator, VideoProperties, format_number,
};
use crate::engine::error::ExtractionError;
use crate::engine::probe::MediaProbe;
use crate::engine::process::run_to_completion;

/// ffmpeg's complaint when zscale cannot convert the source's colour space
const COLORSPACE_MISMATCH: &str = "no path between colorspaces";

/// Untouched and converted frames at the same position
#[derive(Debug, Clone)]
pub struct PreviewPair {
    pub timestamp: f64,
    pub original: RgbImage,
    /// Converted at gamma 1.0; apply [`gamma_adjust`] for the slider value
    pub converted: RgbImage,
}

pub struct FramePreviewPipeline<P: MediaProbe> {
    ffmpeg: PathBuf,
    probe: P,
}

impl<P: MediaProbe> FramePreviewPipeline<P> {
    pub fn new(ffmpeg: impl Into<PathBuf>, probe: P) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            probe,
        }
    }

    /// Decode one frame at `timestamp` (default: a third of the way in)
    pub fn extract_frame(
        &self,
        path: &Path,
        timestamp: Option<f64>,
    ) -> Result<RgbImage, ExtractionError> {
        let props = self.probe_with_duration(path)?;
        let at = timestamp.unwrap_or_else(|| default_timestamp(&props));
        self.run(path, at, None)
    }

    /// Decode one frame through the conversion filter chain at native size
    pub fn extract_frame_with_conversion(
        &self,
        path: &Path,
        gamma: f64,
        kind: FilterKind,
        tonemap: TonemapOperator,
        timestamp: Option<f64>,
    ) -> Result<RgbImage, ExtractionError> {
        let props = self.probe_with_duration(path)?;
        let at = timestamp.unwrap_or_else(|| default_timestamp(&props));
        let chain = self.preview_chain(path, gamma, kind, tonemap);
        self.run(path, at, Some(&chain))
    }

    /// Both frames at one position, probing the source once
    pub fn preview_pair(
        &self,
        path: &Path,
        kind: FilterKind,
        tonemap: TonemapOperator,
        timestamp: Option<f64>,
    ) -> Result<PreviewPair, ExtractionError> {
        let props = self.probe_with_duration(path)?;
        let at = timestamp.unwrap_or_else(|| default_timestamp(&props));
        let chain = self.preview_chain(path, 1.0, kind, tonemap);

        Ok(PreviewPair {
            timestamp: at,
            original: self.run(path, at, None)?,
            converted: self.run(path, at, Some(&chain))?,
        })
    }

    /// Probe and reject sources without a usable duration
    pub fn probe_with_duration(&self, path: &Path) -> Result<VideoProperties, ExtractionError> {
        let props = self.probe.probe(path)?;
        if !(props.duration.is_finite() && props.duration > 0.0) {
            return Err(ExtractionError::InvalidDuration(props.duration));
        }
        Ok(props)
    }

    fn preview_chain(
        &self,
        path: &Path,
        gamma: f64,
        kind: FilterKind,
        tonemap: TonemapOperator,
    ) -> String {
        let max_fall = match kind {
            FilterKind::Dynamic => self.probe.max_frame_average_light(path),
            FilterKind::Static => None,
        };
        FilterChain::new(kind, tonemap, gamma, Scale::Native)
            .with_max_fall(max_fall)
            .render()
    }

    fn run(
        &self,
        path: &Path,
        timestamp: f64,
        chain: Option<&str>,
    ) -> Result<RgbImage, ExtractionError> {
        let args = preview_args(path, timestamp, chain);
        debug!(
            "Extracting preview frame: {} {}",
            self.ffmpeg.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output =
            run_to_completion(self.ffmpeg.as_os_str(), &args).map_err(ExtractionError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("Preview extraction failed: {}", stderr);
            return Err(classify_failure(output.status.code(), stderr));
        }

        decode_frame(&output.stdout)
    }
}

/// Arguments for a single-frame PNG extraction to stdout
pub fn preview_args(path: &Path, timestamp: f64, chain: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-ss"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(format_number(timestamp).into());
    args.push("-i".into());
    args.push(path.as_os_str().to_owned());
    if let Some(chain) = chain {
        args.push("-vf".into());
        args.push(chain.into());
    }
    for arg in ["-frames:v", "1", "-f", "image2pipe", "-c:v", "png", "-"] {
        args.push(arg.into());
    }
    args
}

fn default_timestamp(props: &VideoProperties) -> f64 {
    props.duration / 3.0
}

fn classify_failure(code: Option<i32>, stderr: String) -> ExtractionError {
    if stderr.contains(COLORSPACE_MISMATCH) {
        ExtractionError::ColorspaceMismatch
    } else {
        ExtractionError::ExitStatus { code, stderr }
    }
}

/// Decode a PNG frame from ffmpeg's stdout
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, ExtractionError> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
    Ok(image.to_rgb8())
}

/// Evenly spaced preview position: `index / (total + 1) * duration`
pub fn frame_position(index: usize, total: usize, duration: f64) -> f64 {
    index as f64 / (total as f64 + 1.0) * duration
}

/// Per-channel gamma lookup applied locally, so slider moves never re-run ffmpeg.
///
/// `out = round(clamp((in / 255) ^ (1 / gamma) * 255, 0, 255))`. Non-positive
/// or non-finite gamma returns an unmodified copy.
pub fn gamma_adjust(image: &RgbImage, gamma: f64) -> RgbImage {
    if !(gamma.is_finite() && gamma > 0.0) {
        return image.clone();
    }

    let lut = gamma_table(gamma);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = lut[*channel as usize];
        }
    }
    out
}

fn gamma_table(gamma: f64) -> [u8; 256] {
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = (i as f64 / 255.0).powf(inv) * 255.0;
        *entry = v.clamp(0.0, 255.0).round() as u8;
    }
    lut
}
