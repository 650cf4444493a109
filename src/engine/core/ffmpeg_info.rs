use anyhow::{Context, Result};
use std::path::Path;

use crate::engine::process::run_to_completion;

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version(ffmpeg: &Path) -> Result<String> {
    tool_version(ffmpeg, "ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version(ffprobe: &Path) -> Result<String> {
    tool_version(ffprobe, "ffprobe")
}

fn tool_version(program: &Path, name: &str) -> Result<String> {
    let output = run_to_completion(program.as_os_str(), ["-version"]).with_context(|| {
        format!(
            "Failed to execute {}. Is {} installed and in PATH?",
            program.display(),
            name
        )
    })?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", name, output.status);
    }

    Ok(parse_version_line(&String::from_utf8_lossy(&output.stdout)))
}

/// First line of `-version` output
pub fn parse_version_line(version_output: &str) -> String {
    version_output
        .lines()
        .next()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("Unknown version")
        .to_string()
}
