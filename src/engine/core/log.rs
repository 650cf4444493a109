use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Location of the debug log: `<config dir>/hdr2sdr/hdr2sdr.log`,
/// falling back to the current directory
pub fn debug_log_path() -> Result<PathBuf> {
    match dirs::config_dir() {
        Some(dir) => Ok(dir.join("hdr2sdr").join("hdr2sdr.log")),
        None => Ok(std::env::current_dir()?.join("hdr2sdr.log")),
    }
}

/// Append a timestamped entry to the debug log, creating it if needed
pub fn write_debug_log(message: &str) -> Result<()> {
    let log_path = debug_log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, message)?;
    Ok(())
}
