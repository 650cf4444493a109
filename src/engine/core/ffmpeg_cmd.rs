use super::filter::{FilterChain, Scale, format_number};
use super::types::{Codec, ConversionRequest, VideoProperties};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Host platform as far as hardware acceleration is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }

    /// CUDA decode + NVENC is only wired up for Linux and Windows
    pub fn supports_hwaccel(&self) -> bool {
        matches!(self, Platform::Linux | Platform::Windows)
    }
}

/// Raised when a GPU request had to be downgraded to the CPU path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityWarning {
    PlatformUnsupported(Platform),
    CodecUnsupported(Codec),
}

impl fmt::Display for CapabilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityWarning::PlatformUnsupported(platform) => write!(
                f,
                "GPU acceleration is not supported on this platform ({:?}); using CPU encoding",
                platform
            ),
            CapabilityWarning::CodecUnsupported(codec) => write!(
                f,
                "{} has no GPU encoder; using CPU encoding",
                codec.display_name()
            ),
        }
    }
}

/// Output of [`CommandBuilder::build`]
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Effective GPU flag after capability checks
    pub use_gpu: bool,
    pub warnings: Vec<CapabilityWarning>,
}

impl BuiltCommand {
    /// Arguments as UTF-8 (lossy), for assertions and display
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    /// Value following `flag`, if present
    pub fn arg_after(&self, flag: &str) -> Option<String> {
        let args = self.args_lossy();
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).cloned()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Shell-quoted rendering for dry runs and logs
    pub fn to_shell_string(&self) -> String {
        let mut words = vec![self.program.to_string_lossy().to_string()];
        words.extend(self.args_lossy());
        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }
}

/// Builds the ffmpeg argument vector for a conversion. Pure: no probing,
/// no environment reads beyond the `Platform` captured at construction.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ffmpeg: PathBuf,
    platform: Platform,
}

impl CommandBuilder {
    pub fn new(ffmpeg: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            platform,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn ffmpeg(&self) -> &PathBuf {
        &self.ffmpeg
    }

    /// Build the full transcode command for `request` against probed `props`
    pub fn build(&self, request: &ConversionRequest, props: &VideoProperties) -> BuiltCommand {
        let mut args: Vec<OsString> = Vec::new();
        let mut warnings = Vec::new();
        let mut use_gpu = request.use_gpu;

        push(&mut args, ["-loglevel", "info"]);

        if use_gpu && !self.platform.supports_hwaccel() {
            warnings.push(CapabilityWarning::PlatformUnsupported(self.platform));
            use_gpu = false;
        }
        if use_gpu && request.codec == Codec::H265 {
            warnings.push(CapabilityWarning::CodecUnsupported(Codec::H265));
            use_gpu = false;
        }

        if use_gpu {
            push(&mut args, ["-hwaccel", "cuda", "-hwaccel_device", "0"]);
        }

        args.push("-i".into());
        args.push(request.input_path.clone().into_os_string());

        // Filter has to come before the stream maps
        let chain = FilterChain::new(
            request.filter_kind,
            request.tonemap,
            request.gamma,
            Scale::Target {
                width: props.width,
                height: props.height,
            },
        )
        .with_max_fall(props.max_frame_average_light);
        args.push("-filter_complex".into());
        args.push(format!("[0:v:0]{}[vout]", chain.render()).into());
        push(&mut args, ["-map", "[vout]"]);

        // Optional maps: absent audio/subtitles are not an error
        push(&mut args, ["-map", "0:a?", "-map", "0:s?"]);

        apply_encoder_settings(&mut args, request.codec, use_gpu, props.bit_rate);

        args.push("-r".into());
        args.push(format_number(props.frame_rate).into());
        push(
            &mut args,
            [
                "-strict",
                "-2",
                "-c:a",
                "copy",
                "-c:s",
                "copy",
                "-map_metadata",
                "0",
                "-movflags",
                "+faststart",
            ],
        );
        args.push(request.output_path.clone().into_os_string());
        args.push("-y".into());

        let built = BuiltCommand {
            program: self.ffmpeg.clone(),
            args,
            use_gpu,
            warnings,
        };
        debug!("Constructed ffmpeg command: {}", built.to_shell_string());
        built
    }
}

fn push<const N: usize>(args: &mut Vec<OsString>, values: [&str; N]) {
    args.extend(values.iter().map(OsString::from));
}

fn apply_encoder_settings(args: &mut Vec<OsString>, codec: Codec, use_gpu: bool, bit_rate: u64) {
    match (codec, use_gpu) {
        (Codec::H264, true) => {
            push(
                args,
                [
                    "-c:v",
                    "h264_nvenc",
                    "-preset",
                    "p4",
                    "-tune",
                    "hq",
                    "-rc",
                    "vbr",
                    "-cq",
                    "20",
                ],
            );
            args.push("-b:v".into());
            args.push(bit_rate.to_string().into());
            args.push("-maxrate".into());
            args.push(bit_rate.to_string().into());
            args.push("-bufsize".into());
            args.push(bit_rate.saturating_mul(2).to_string().into());
        }
        (Codec::H264, false) => {
            push(
                args,
                ["-c:v", "libx264", "-preset", "medium", "-tune", "film", "-crf", "23"],
            );
            args.push("-b:v".into());
            args.push(bit_rate.to_string().into());
            push(args, ["-profile:v", "high", "-level", "4.0"]);
        }
        // H.265 on the GPU is downgraded in build()
        (Codec::H265, _) => {
            push(
                args,
                [
                    "-c:v",
                    "libx265",
                    "-preset",
                    "medium",
                    "-crf",
                    "28",
                    "-tune",
                    "film",
                    "-pix_fmt",
                    "yuv420p", // 8-bit SDR output
                    "-x265-params",
                    "keyint=240:min-keyint=24:scenecut=40",
                ],
            );
        }
    }
}
