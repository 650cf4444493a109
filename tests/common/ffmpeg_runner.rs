#![allow(dead_code)] // Unix-only scripts; other platforms compile the module without using it

//! Stand-in ffmpeg/ffprobe executables for end-to-end tests.
//!
//! Each script is a small POSIX shell program written into a temp dir. They
//! `exec` long-running commands so a SIGTERM reaches the process that owns
//! the stderr pipe.

use std::fs;
use std::path::{Path, PathBuf};

/// ffprobe JSON for a 20 second 1080p HEVC source
pub const PROBE_JSON: &str = r#"{
  "streams": [
    {"index": 0, "codec_type": "video", "codec_name": "hevc", "width": 1920, "height": 1080,
     "avg_frame_rate": "24/1", "bit_rate": "8000000"},
    {"index": 1, "codec_type": "audio", "codec_name": "aac", "bit_rate": "192000"},
    {"index": 2, "codec_type": "subtitle", "codec_name": "subrip", "tags": {"language": "eng"}}
  ],
  "format": {"duration": "20.000000"}
}"#;

/// Frame side data carrying MaxFALL 350
pub const FRAMES_JSON: &str = r#"{"frames": [{"side_data_list": [
  {"side_data_type": "Mastering display metadata", "max_fall": "350"}
]}]}"#;

/// ffmpeg that fails like a machine without a CUDA driver when asked for NVENC
pub const FFMPEG_CUDA_FAILS: &str = r#"case "$*" in
  *h264_nvenc*)
    echo "[AVHWDeviceContext @ 0x1] Cannot load libcuda.so.1" >&2
    echo "Device creation failed: -1." >&2
    exit 1
    ;;
esac
printf 'frame=120 time=00:00:05.00 bitrate=1.0kbits/s\r' >&2
printf 'frame=240 time=00:00:10.00 bitrate=1.0kbits/s\r' >&2
exit 0
"#;

/// ffmpeg that runs until terminated
pub const FFMPEG_HANGS: &str = r#"echo "frame=24 time=00:00:01.00 bitrate=1.0kbits/s" >&2
exec sleep 30
"#;

/// ffmpeg that fails without any hardware signature
pub const FFMPEG_FAILS: &str = r#"echo "Error opening output file: Permission denied" >&2
exit 1
"#;

/// ffmpeg preview failure on an incompatible source
pub const FFMPEG_COLORSPACE: &str = r#"echo "[zscale @ 0x1] code 3074: no path between colorspaces" >&2
exit 1
"#;

/// `ffmpeg -encoders` listing, with or without the NVENC entry
pub fn encoders_listing(with_nvenc: bool) -> String {
    let nvenc = if with_nvenc {
        " V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)\n"
    } else {
        ""
    };
    format!(
        "cat <<'EOF'\nEncoders:\n V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)\n{}EOF\n",
        nvenc
    )
}

/// Stub tools in a temp directory
pub struct FakeTools {
    pub dir: tempfile::TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// ffprobe answering the stream probe and the side-data probe
    pub fn ffprobe(&self) -> PathBuf {
        let body = format!(
            "case \"$*\" in\n  *-show_frames*) cat <<'EOF'\n{}\nEOF\n  ;;\n  *) cat <<'EOF'\n{}\nEOF\n  ;;\nesac\n",
            FRAMES_JSON, PROBE_JSON
        );
        self.script("ffprobe", &body)
    }

    /// ffprobe reporting zero duration
    pub fn ffprobe_zero_duration(&self) -> PathBuf {
        let json = PROBE_JSON.replace("20.000000", "0");
        self.script("ffprobe-zero", &format!("cat <<'EOF'\n{}\nEOF\n", json))
    }

    /// ffmpeg with the given body
    pub fn ffmpeg(&self, name: &str, body: &str) -> PathBuf {
        self.script(name, body)
    }

    /// nvidia-smi stand-in exiting with `code`
    pub fn gpu_query(&self, code: i32) -> PathBuf {
        self.script("nvidia-smi", &format!("echo 'NVIDIA GeForce RTX 4070'\nexit {}\n", code))
    }

    /// ffmpeg that writes `png` to stdout and records its arguments
    pub fn ffmpeg_emitting_png(&self, png: &Path) -> PathBuf {
        let args_log = self.path().join("preview-args.log");
        let body = format!(
            "echo \"$@\" >> '{}'\ncat '{}'\n",
            args_log.display(),
            png.display()
        );
        self.script("ffmpeg-preview", &body)
    }

    /// Argument lines recorded by [`ffmpeg_emitting_png`](Self::ffmpeg_emitting_png)
    pub fn recorded_preview_args(&self) -> Vec<String> {
        fs::read_to_string(self.path().join("preview-args.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[cfg(unix)]
    fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{}", body)).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
        path
    }

    #[cfg(not(unix))]
    fn script(&self, name: &str, _body: &str) -> PathBuf {
        self.path().join(name)
    }
}
