//! Request validation ahead of probing and spawning.

use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::core::{ConversionRequest, MAX_GAMMA, MIN_GAMMA};
use crate::engine::error::ValidationError;

/// Check a request and return a copy with absolute paths.
pub fn validate_request(request: &ConversionRequest) -> Result<ConversionRequest, ValidationError> {
    if request.input_path.as_os_str().is_empty() || request.output_path.as_os_str().is_empty() {
        return Err(ValidationError::MissingPaths);
    }

    let input_path = absolutize(&request.input_path);
    let output_path = absolutize(&request.output_path);

    if !input_path.is_file() {
        return Err(ValidationError::InputNotFound(input_path));
    }

    if same_file(&input_path, &output_path) {
        return Err(ValidationError::SameInputOutput(output_path));
    }

    validate_gamma(request.gamma)?;

    Ok(ConversionRequest {
        input_path,
        output_path,
        ..request.clone()
    })
}

/// Gamma must be finite and within the slider range
pub fn validate_gamma(gamma: f64) -> Result<(), ValidationError> {
    if gamma.is_finite() && (MIN_GAMMA..=MAX_GAMMA).contains(&gamma) {
        Ok(())
    } else {
        Err(ValidationError::GammaOutOfRange(gamma))
    }
}

/// `<stem>_sdr<ext>` next to the input: `/v/movie.mkv` -> `/v/movie_sdr.mkv`
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    let mut name = stem.to_os_string();
    name.push("_sdr");
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    input.with_file_name(name)
}

/// Refuse to replace an existing output unless `force` is set
pub fn check_overwrite(output: &Path, force: bool) -> Result<(), ValidationError> {
    if !force && output.exists() {
        Err(ValidationError::OutputExists(output.to_path_buf()))
    } else {
        Ok(())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    // Symlinks and `..` only resolve when both exist
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
