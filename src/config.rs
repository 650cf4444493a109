// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{Codec, ConversionRequest, FilterKind, TonemapOperator, ToolPaths};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// ffmpeg executable (bare name resolves on PATH)
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,

    /// Vendor tool used to detect an NVIDIA GPU
    #[serde(default = "default_gpu_query")]
    pub gpu_query: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    #[serde(default)]
    pub filter: FilterKind,

    #[serde(default)]
    pub tonemap: TonemapOperator,

    #[serde(default)]
    pub codec: Codec,

    /// Hardware encoding enabled (NVENC)
    #[serde(default)]
    pub use_gpu: bool,

    /// Number of evenly spaced preview frames offered by `preview --frame`
    #[serde(default = "default_preview_frames")]
    pub preview_frames: usize,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_gpu_query() -> PathBuf {
    PathBuf::from("nvidia-smi")
}

fn default_gamma() -> f64 {
    1.0
}

fn default_preview_frames() -> usize {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            gpu_query: default_gpu_query(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            gamma: default_gamma(),
            filter: FilterKind::default(),
            tonemap: TonemapOperator::default(),
            codec: Codec::default(),
            use_gpu: false, // Default to software encoding
            preview_frames: default_preview_frames(),
        }
    }
}

impl ToolsConfig {
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            gpu_query: self.gpu_query.clone(),
        }
    }
}

impl DefaultsConfig {
    /// Request pre-filled with the configured tuning
    pub fn request(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> ConversionRequest {
        ConversionRequest {
            gamma: self.gamma,
            use_gpu: self.use_gpu,
            filter_kind: self.filter,
            tonemap: self.tonemap,
            codec: self.codec,
            ..ConversionRequest::new(input, output)
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("hdr2sdr")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("hdr2sdr")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Don't fail if the directory isn't writable
            if let Err(e) = config.save() {
                tracing::warn!("Could not create default config file: {:#}", e);
                eprintln!(
                    "Using built-in defaults. Run 'hdr2sdr init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            let config = Config::default();
            config.save()?;
        }
        Ok(())
    }
}
