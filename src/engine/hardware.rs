//! NVIDIA GPU encoding detection

use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::core::ConversionRequest;
use crate::engine::process::run_to_completion;

/// Hardware encoder probed for in `ffmpeg -encoders`
pub const GPU_ENCODER: &str = "h264_nvenc";

/// Locations of the external executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Vendor GPU-management tool
    pub gpu_query: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            gpu_query: PathBuf::from("nvidia-smi"),
        }
    }
}

/// Outcome of the GPU pre-flight checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuReport {
    pub available: bool,
    pub gpu_tool_ok: bool,
    pub encoder_ok: bool,
    pub gpu_model: Option<String>,
    pub error_message: Option<String>,
}

/// Run both GPU checks and explain the result
pub fn gpu_report(tools: &ToolPaths) -> GpuReport {
    let gpu_model = query_gpu_model(tools);
    let gpu_tool_ok = gpu_model.is_some() || gpu_tool_runs(tools);
    let encoder_ok = gpu_tool_ok && encoder_listed(tools);
    let available = gpu_tool_ok && encoder_ok;

    let error_message = if available {
        None
    } else if !gpu_tool_ok {
        Some(format!("{} not found or failed", tools.gpu_query.display()))
    } else {
        Some(format!("FFmpeg {} not found", GPU_ENCODER))
    };

    debug!(
        "GPU pre-flight: tool_ok={} encoder_ok={} model={:?}",
        gpu_tool_ok, encoder_ok, gpu_model
    );

    GpuReport {
        available,
        gpu_tool_ok,
        encoder_ok,
        gpu_model,
        error_message,
    }
}

/// True when the vendor tool runs and ffmpeg lists the hardware encoder
pub fn probe_gpu_availability(tools: &ToolPaths) -> bool {
    gpu_tool_runs(tools) && encoder_listed(tools)
}

/// Clear `use_gpu` on a GPU request when this machine cannot encode on the GPU.
/// Returns the flag the request ends up with.
pub fn downgrade_unavailable_gpu(request: &mut ConversionRequest, tools: &ToolPaths) -> bool {
    if request.use_gpu && !probe_gpu_availability(tools) {
        warn!(
            "GPU encoding requested but {} or FFmpeg {} is unavailable; using CPU",
            tools.gpu_query.display(),
            GPU_ENCODER
        );
        request.use_gpu = false;
    }
    request.use_gpu
}

fn gpu_tool_runs(tools: &ToolPaths) -> bool {
    run_to_completion(tools.gpu_query.as_os_str(), std::iter::empty::<OsString>())
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn encoder_listed(tools: &ToolPaths) -> bool {
    match run_to_completion(tools.ffmpeg.as_os_str(), ["-hide_banner", "-encoders"]) {
        Ok(out) if out.status.success() => {
            lists_encoder(&String::from_utf8_lossy(&out.stdout), GPU_ENCODER)
        }
        _ => false,
    }
}

/// GPU name from `nvidia-smi --query-gpu=name`
fn query_gpu_model(tools: &ToolPaths) -> Option<String> {
    let output = run_to_completion(
        tools.gpu_query.as_os_str(),
        ["--query-gpu=name", "--format=csv,noheader"],
    )
    .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let name = stdout.lines().next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Whether `ffmpeg -encoders` output has an entry named `encoder`
pub fn lists_encoder(encoders_output: &str, encoder: &str) -> bool {
    encoders_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}
